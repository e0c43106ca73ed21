//! Test utilities for deterministic hub session tests
//!
//! Mock clock, a transport that records every command, and a listener that
//! records every notification as a `HubEvent`.

#![allow(dead_code)]

use hubsession_core::{
    HubEvent, HubListener, HubSession, HubTransport, HubUser, OutgoingCommand, ProtocolSignal,
    SearchRequest, SessionConfig, TimeSource, Timestamp, TransportError, UserRecord,
};
use hubsession_core::{ConnectionState, DecodedFeatures};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

// ----------------------------------------------------------------------------
// Mock Time Source
// ----------------------------------------------------------------------------

/// Mock time source for deterministic testing
#[derive(Debug, Clone)]
pub struct MockTimeSource {
    current_time: Arc<AtomicU64>,
}

impl MockTimeSource {
    /// Create a new mock time source starting at a specific time
    pub fn new_at(start_time: u64) -> Self {
        Self {
            current_time: Arc::new(AtomicU64::new(start_time)),
        }
    }

    /// Advance time by the specified number of milliseconds
    pub fn advance(&self, millis: u64) {
        self.current_time.fetch_add(millis, Ordering::SeqCst);
    }

    /// Set the time to a specific value
    pub fn set_time(&self, millis: u64) {
        self.current_time.store(millis, Ordering::SeqCst);
    }
}

impl TimeSource for MockTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.current_time.load(Ordering::SeqCst))
    }
}

// ----------------------------------------------------------------------------
// Recording Transport
// ----------------------------------------------------------------------------

/// What the session asked the transport to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Connect(String),
    Send(OutgoingCommand),
    Disconnect { graceful: bool },
}

/// Transport that records calls and can be told to fail
#[derive(Debug, Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<TransportCall>>,
    fail_connect: AtomicBool,
    fail_send: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    pub fn sent(&self) -> Vec<OutgoingCommand> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                TransportCall::Send(command) => Some(command.clone()),
                _ => None,
            })
            .collect()
    }

    /// Filters of every search written, in order
    pub fn searches(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|command| match command {
                OutgoingCommand::Search(request) => Some(request.filter),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

impl HubTransport for RecordingTransport {
    fn connect(&self, hub_url: &str) -> Result<(), TransportError> {
        self.calls
            .lock()
            .push(TransportCall::Connect(hub_url.to_string()));
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectFailed {
                address: hub_url.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    fn send(&self, command: OutgoingCommand) -> Result<(), TransportError> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed {
                reason: "broken pipe".to_string(),
            });
        }
        self.calls.lock().push(TransportCall::Send(command));
        Ok(())
    }

    fn disconnect(&self, graceful: bool) {
        self.calls
            .lock()
            .push(TransportCall::Disconnect { graceful });
    }
}

// ----------------------------------------------------------------------------
// Recording Listener
// ----------------------------------------------------------------------------

/// Listener that stores every notification
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<HubEvent>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<HubEvent> {
        self.events.lock().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(HubEvent::name).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|e| e.name() == name).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn push(&self, event: HubEvent) {
        self.events.lock().push(event);
    }
}

impl HubListener for RecordingListener {
    fn on_connecting(&self, hub_url: &str) {
        self.push(HubEvent::Connecting {
            hub_url: hub_url.to_string(),
        });
    }

    fn on_connected(&self) {
        self.push(HubEvent::Connected);
    }

    fn on_logged_in(&self) {
        self.push(HubEvent::LoggedIn);
    }

    fn on_failed(&self, reason: &str) {
        self.push(HubEvent::Failed {
            reason: reason.to_string(),
        });
    }

    fn on_disconnected(&self) {
        self.push(HubEvent::Disconnected);
    }

    fn on_state_changed(&self, from: ConnectionState, to: ConnectionState) {
        self.push(HubEvent::StateChanged { from, to });
    }

    fn on_user_updated(&self, user: &HubUser) {
        self.push(HubEvent::UserUpdated(user.clone()));
    }

    fn on_user_list_updated(&self, users: &[HubUser]) {
        self.push(HubEvent::UserListUpdated(users.to_vec()));
    }

    fn on_user_removed(&self, user_id: &str) {
        self.push(HubEvent::UserRemoved {
            user_id: user_id.to_string(),
        });
    }

    fn on_hub_updated(&self, features: &DecodedFeatures) {
        self.push(HubEvent::HubUpdated(features.clone()));
    }

    fn on_get_password(&self) {
        self.push(HubEvent::GetPassword);
    }

    fn on_status_message(&self, message: &str) {
        self.push(HubEvent::StatusMessage(message.to_string()));
    }

    fn on_search_dispatched(&self, request: &SearchRequest) {
        self.push(HubEvent::SearchDispatched(request.clone()));
    }
}

// ----------------------------------------------------------------------------
// Session Fixtures
// ----------------------------------------------------------------------------

/// Session wired to recording collaborators and a mock clock at t=1000
pub struct Fixture {
    pub session: Arc<HubSession>,
    pub transport: Arc<RecordingTransport>,
    pub listener: Arc<RecordingListener>,
    pub clock: MockTimeSource,
}

pub fn fixture(config: SessionConfig) -> Fixture {
    let transport = RecordingTransport::new();
    let listener = RecordingListener::new();
    let clock = MockTimeSource::new_at(1_000);
    let session = Arc::new(
        HubSession::new(config, transport.clone()).with_time_source(Arc::new(clock.clone())),
    );
    session
        .add_listener(listener.clone())
        .expect("listener registration");
    Fixture {
        session,
        transport,
        listener,
        clock,
    }
}

/// Drive a session through a password-less ADC login
pub fn log_in(session: &HubSession) {
    session.connect();
    session.on_transport_connected();
    session.on_signal(ProtocolSignal::HubFeatures {
        tokens: vec!["ADBASE".to_string(), "ADTIGR".to_string()],
    });
    session.on_signal(ProtocolSignal::ProtocolAccepted);
    session.on_signal(ProtocolSignal::IdentityAcknowledged);
}

pub fn user(id: &str, supports: &[&str]) -> ProtocolSignal {
    ProtocolSignal::UserRecord(UserRecord {
        id: id.to_string(),
        nick: format!("nick-{}", id),
        share_size: 0,
        supports: supports.iter().map(|s| s.to_string()).collect(),
    })
}
