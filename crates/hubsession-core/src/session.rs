//! Hub Session
//!
//! `HubSession` ties the lifecycle state machine, feature negotiation, the
//! user-list tracker and the search scheduler to one hub connection. It is
//! driven from three directions:
//!
//! - the transport thread calls `on_transport_connected`,
//!   `on_transport_failed` and `on_signal`;
//! - application threads call `connect`, `disconnect`, `search` and friends;
//! - a periodic timer calls `on_tick`.
//!
//! Each piece of mutable state sits behind its own short-held lock. Locks are
//! released before any listener or transport call, so listeners may call back
//! into the session.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::bulk_list::{BulkListState, BulkListTracker, RecordOutcome};
use crate::config::{Dialect, SearchIntervalConfig, SessionConfig};
use crate::connection_state::{
    AuditEntry, ConnectionState, SessionEffect, SessionEvent, StateTransition,
    StateTransitionError,
};
use crate::errors::{ConfigError, SchedulerError, TransportError};
use crate::event_bus::EventBus;
use crate::events::{HubEvent, HubListener};
use crate::features::{
    check_hub_features, default_local_features, CapabilitySet, DecodedFeatures,
    FeatureNegotiator, HubFeatureCheck,
};
use crate::search::{SearchRequest, SearchScheduler};
use crate::types::{OwnerId, SessionId, SystemTimeSource, TimeSource, Timestamp};
use crate::Result;

/// Number of transitions kept in the audit trail
pub const MAX_AUDIT_ENTRIES: usize = 64;

// ----------------------------------------------------------------------------
// Protocol Vocabulary
// ----------------------------------------------------------------------------

/// A user as reported by the hub's line parser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub nick: String,
    #[serde(default)]
    pub share_size: u64,
    /// Raw feature tokens from the user's record
    #[serde(default)]
    pub supports: Vec<String>,
}

/// A user with decoded features, as announced to listeners
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubUser {
    pub id: String,
    pub nick: String,
    pub share_size: u64,
    pub capabilities: CapabilitySet,
}

/// Parsed hub traffic handed to the session by the dialect parser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolSignal {
    /// The hub's feature announcement
    HubFeatures { tokens: Vec<String> },
    ProtocolAccepted,
    PasswordRequested,
    PasswordAccepted,
    IdentityAcknowledged,
    UserRecord(UserRecord),
    /// Explicit end of the initial user list
    UserListEnd,
    UserQuit { id: String },
    PortTestStarted,
    PortTestFinished,
    Status { message: String },
    ProtocolViolation { reason: String },
    /// Anything else the parser recognized but the session does not act on
    Other,
}

/// Commands the session asks the transport to write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutgoingCommand {
    Supports { tokens: Vec<String> },
    Search(SearchRequest),
    Password(String),
    KeepAlive,
}

/// Outcome of [`HubSession::search`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchEta {
    /// Written to the transport straight away
    Sent,
    /// Queued; `eta_ms` is the expected delay, if one can be estimated
    Queued { eta_ms: Option<u64> },
}

// ----------------------------------------------------------------------------
// Collaborators
// ----------------------------------------------------------------------------

/// Byte-level connection to the hub
pub trait HubTransport: Send + Sync {
    /// Start opening a connection. Completion is reported back through
    /// [`HubSession::on_transport_connected`] or
    /// [`HubSession::on_transport_failed`].
    fn connect(&self, hub_url: &str) -> core::result::Result<(), TransportError>;

    fn send(&self, command: OutgoingCommand) -> core::result::Result<(), TransportError>;

    fn disconnect(&self, graceful: bool);
}

/// Local identity and the consumer of negotiated hub features
pub trait UserDirectory: Send + Sync {
    /// Features to announce to the hub
    fn local_features(&self, dialect: Dialect) -> CapabilitySet {
        default_local_features(dialect)
    }

    fn on_hub_features(&self, _features: &DecodedFeatures) {}

    /// Password to answer a hub challenge with, if one is saved
    fn stored_password(&self) -> Option<String> {
        None
    }
}

/// Directory with default features and no stored password
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDirectory;

impl UserDirectory for DefaultDirectory {}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

#[derive(Debug)]
struct SessionState {
    connection: ConnectionState,
    last_activity: Timestamp,
    hub_features: Option<DecodedFeatures>,
    legacy_password: bool,
    audit_trail: VecDeque<AuditEntry>,
}

impl SessionState {
    fn record(&mut self, entry: AuditEntry) {
        if self.audit_trail.len() == MAX_AUDIT_ENTRIES {
            self.audit_trail.pop_front();
        }
        self.audit_trail.push_back(entry);
    }
}

/// One hub connection and everything negotiated over it
pub struct HubSession {
    id: SessionId,
    config: SessionConfig,
    state: Mutex<SessionState>,
    scheduler: SearchScheduler,
    users: Mutex<BulkListTracker<HubUser>>,
    listeners: EventBus<dyn HubListener>,
    transport: Arc<dyn HubTransport>,
    directory: Arc<dyn UserDirectory>,
    time_source: Arc<dyn TimeSource>,
    hub_negotiator: FeatureNegotiator,
    user_negotiator: Option<FeatureNegotiator>,
}

impl HubSession {
    /// Create a session in `Connecting`. Nothing is sent until
    /// [`connect`](Self::connect) is called.
    pub fn new(config: SessionConfig, transport: Arc<dyn HubTransport>) -> Self {
        let time_source: Arc<dyn TimeSource> = Arc::new(SystemTimeSource::new());
        let now = time_source.now();
        Self {
            id: SessionId::new(),
            scheduler: SearchScheduler::new(config.search),
            hub_negotiator: FeatureNegotiator::for_hub(config.dialect),
            user_negotiator: FeatureNegotiator::for_users(config.dialect),
            config,
            state: Mutex::new(SessionState {
                connection: ConnectionState::Connecting,
                last_activity: now,
                hub_features: None,
                legacy_password: false,
                audit_trail: VecDeque::new(),
            }),
            users: Mutex::new(BulkListTracker::new()),
            listeners: EventBus::new(),
            transport,
            directory: Arc::new(DefaultDirectory),
            time_source,
        }
    }

    /// Use a different local identity / feature consumer
    pub fn with_directory(mut self, directory: Arc<dyn UserDirectory>) -> Self {
        self.directory = directory;
        self
    }

    /// Use a different clock
    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.state.get_mut().last_activity = time_source.now();
        self.time_source = time_source;
        self
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state.lock().connection
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Logged in (`Normal`)
    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Features the hub announced on this connection
    pub fn hub_features(&self) -> Option<DecodedFeatures> {
        self.state.lock().hub_features.clone()
    }

    /// The hub lacks Tiger hashing and expects the legacy password scheme
    pub fn uses_legacy_password(&self) -> bool {
        self.state.lock().legacy_password
    }

    /// Most recent transitions, oldest first
    pub fn audit_trail(&self) -> Vec<AuditEntry> {
        self.state.lock().audit_trail.iter().cloned().collect()
    }

    pub fn user_list_state(&self) -> BulkListState {
        self.users.lock().state()
    }

    pub fn listeners(&self) -> &EventBus<dyn HubListener> {
        &self.listeners
    }

    pub fn add_listener(&self, listener: Arc<dyn HubListener>) -> Result<bool> {
        self.listeners.add_listener(listener)
    }

    pub fn remove_listener(&self, listener: &Arc<dyn HubListener>) -> bool {
        self.listeners.remove_listener(listener)
    }

    pub fn scheduler(&self) -> &SearchScheduler {
        &self.scheduler
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Open (or reopen) the connection. Valid from every state.
    pub fn connect(&self) -> bool {
        self.apply(SessionEvent::Reconnect)
    }

    /// Drop the current connection, if any, and open a new one
    pub fn reconnect(&self) -> bool {
        self.apply(SessionEvent::Reconnect)
    }

    /// Close the connection on request
    pub fn disconnect(&self, graceful: bool) -> bool {
        self.apply(SessionEvent::Close { graceful })
    }

    /// The transport finished opening the connection
    pub fn on_transport_connected(&self) -> bool {
        self.touch();
        self.apply(SessionEvent::TransportConnected)
    }

    /// The transport lost or could not open the connection
    pub fn on_transport_failed<T: Into<String>>(&self, reason: T) -> bool {
        self.apply(SessionEvent::TransportFailed {
            reason: reason.into(),
        })
    }

    /// Handle one parsed piece of hub traffic
    pub fn on_signal(&self, signal: ProtocolSignal) {
        if !self.is_connected() {
            debug!(session = %self.id, ?signal, "dropping signal while disconnected");
            return;
        }
        let now = self.touch();
        trace!(session = %self.id, ?signal, "signal");

        // Any other kind of traffic ends the initial user list
        if !matches!(signal, ProtocolSignal::UserRecord(_)) {
            self.finish_user_list();
        }

        match signal {
            ProtocolSignal::HubFeatures { tokens } => self.handle_hub_features(tokens),
            ProtocolSignal::ProtocolAccepted => {
                self.apply(SessionEvent::ProtocolAccepted);
            }
            ProtocolSignal::PasswordRequested => {
                self.apply(SessionEvent::PasswordRequested);
            }
            ProtocolSignal::PasswordAccepted => {
                self.apply(SessionEvent::PasswordAccepted);
            }
            ProtocolSignal::IdentityAcknowledged => {
                self.apply(SessionEvent::IdentityAcknowledged);
            }
            ProtocolSignal::UserRecord(record) => self.handle_user_record(record, now),
            ProtocolSignal::UserListEnd | ProtocolSignal::Other => {}
            ProtocolSignal::UserQuit { id } => {
                self.notify(HubEvent::UserRemoved { user_id: id });
            }
            ProtocolSignal::PortTestStarted => {
                self.apply(SessionEvent::PortTestStarted);
            }
            ProtocolSignal::PortTestFinished => {
                self.apply(SessionEvent::PortTestFinished);
            }
            ProtocolSignal::Status { message } => {
                self.notify(HubEvent::StatusMessage(message));
            }
            ProtocolSignal::ProtocolViolation { reason } => {
                self.apply(SessionEvent::ProtocolViolation { reason });
            }
        }
    }

    /// Answer a password challenge the user was asked about
    pub fn submit_password<T: Into<String>>(&self, password: T) -> Result<()> {
        let state = self.state();
        if state != ConnectionState::Verify {
            return Err(StateTransitionError::InvalidTransition {
                from_state: state.state_name().to_string(),
                event: "SubmitPassword".to_string(),
                reason: "no password was requested".to_string(),
            }
            .into());
        }
        self.send(OutgoingCommand::Password(password.into()))
    }

    // ------------------------------------------------------------------------
    // Searching
    // ------------------------------------------------------------------------

    /// Submit a search.
    ///
    /// When the session is logged in and the active interval is 0 the search
    /// is sent at once, unless the same query is already queued, in which
    /// case it joins that entry. Otherwise it is queued for
    /// [`on_tick`](Self::on_tick).
    pub fn search(&self, request: SearchRequest) -> Result<SearchEta> {
        let Some(&owner) = request.owners.iter().next() else {
            return Err(SchedulerError::NoOwners.into());
        };
        let now = self.time_source.now();

        if self.is_ready() && self.scheduler.intervals().interval_ms == 0 {
            if let Some(request) = self.scheduler.take_unqueued(request, now)? {
                self.dispatch(request)?;
                return Ok(SearchEta::Sent);
            }
        } else {
            self.scheduler.add(request)?;
        }

        let eta_ms = self
            .scheduler
            .scheduled_time(owner, now)
            .map(|at| at - now);
        debug!(session = %self.id, %owner, ?eta_ms, "search queued");
        Ok(SearchEta::Queued { eta_ms })
    }

    /// Withdraw `owner` from its first queued search
    pub fn cancel_search(&self, owner: OwnerId) -> bool {
        self.scheduler.cancel(owner)
    }

    /// Milliseconds until `owner`'s first manual search is expected to go out
    pub fn search_eta(&self, owner: OwnerId) -> Option<u64> {
        let now = self.time_source.now();
        self.scheduler.scheduled_time(owner, now).map(|at| at - now)
    }

    /// Change the search intervals of a live session
    pub fn set_search_intervals(
        &self,
        intervals: SearchIntervalConfig,
    ) -> core::result::Result<(), ConfigError> {
        intervals.validate()?;
        info!(
            session = %self.id,
            interval_ms = intervals.interval_ms,
            interval_passive_ms = intervals.interval_passive_ms,
            "search intervals updated"
        );
        self.scheduler.set_intervals(intervals);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Timer
    // ------------------------------------------------------------------------

    /// Periodic housekeeping: user-list inactivity, keep-alive and dispatch
    /// of at most one queued search.
    pub fn on_tick(&self) {
        let now = self.time_source.now();

        let idle_batch = self
            .users
            .lock()
            .complete_if_idle(now, self.config.bulk_list_idle_ms);
        if let Some(users) = idle_batch {
            debug!(session = %self.id, "user list ended by inactivity");
            self.notify(HubEvent::UserListUpdated(users));
        }

        if !self.is_ready() {
            return;
        }

        if self.config.keepalive_interval_ms != 0 {
            let idle = now - self.state.lock().last_activity;
            if idle >= self.config.keepalive_interval_ms {
                trace!(session = %self.id, idle, "sending keep-alive");
                if let Err(err) = self.send(OutgoingCommand::KeepAlive) {
                    debug!(session = %self.id, %err, "keep-alive not sent");
                }
            }
        }

        if let Some(request) = self.scheduler.pop(now) {
            if let Err(err) = self.dispatch(request) {
                warn!(session = %self.id, %err, "queued search could not be sent");
            }
        }
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn touch(&self) -> Timestamp {
        let now = self.time_source.now();
        self.state.lock().last_activity = now;
        now
    }

    /// Run one event through the state machine and carry out its effects.
    /// Returns false if the event was not valid in the current state.
    fn apply(&self, event: SessionEvent) -> bool {
        let now = self.time_source.now();
        let transition = {
            let mut state = self.state.lock();
            match state.connection.transition(event, now) {
                Ok(transition) => {
                    state.connection = transition.new_state;
                    state.record(transition.audit_entry.clone());
                    transition
                }
                Err(err) => {
                    warn!(session = %self.id, %err, "ignoring event");
                    return false;
                }
            }
        };

        let StateTransition {
            new_state,
            effects,
            audit_entry,
        } = transition;
        if audit_entry.from_state != new_state {
            info!(
                session = %self.id,
                from = %audit_entry.from_state,
                to = %new_state,
                event = %audit_entry.event,
                "state changed"
            );
            self.notify(HubEvent::StateChanged {
                from: audit_entry.from_state,
                to: new_state,
            });
        }

        for effect in effects {
            self.run_effect(effect);
        }
        true
    }

    fn run_effect(&self, effect: SessionEffect) {
        match effect {
            SessionEffect::CloseTransport { graceful } => self.transport.disconnect(graceful),
            SessionEffect::OpenTransport => {
                if let Err(err) = self.transport.connect(&self.config.hub_url) {
                    self.on_transport_failed(err.to_string());
                }
            }
            SessionEffect::ResetSession => {
                self.users.lock().reset();
                let mut state = self.state.lock();
                state.hub_features = None;
                state.legacy_password = false;
                state.last_activity = self.time_source.now();
            }
            SessionEffect::DropUserList => self.users.lock().reset(),
            SessionEffect::SendLocalFeatures => {
                let local = self.directory.local_features(self.config.dialect);
                let tokens = self
                    .hub_negotiator
                    .tokens(&local)
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                if let Err(err) = self.send(OutgoingCommand::Supports { tokens }) {
                    debug!(session = %self.id, %err, "features not sent");
                }
            }
            SessionEffect::RequestPassword => match self.directory.stored_password() {
                Some(password) => {
                    if let Err(err) = self.send(OutgoingCommand::Password(password)) {
                        debug!(session = %self.id, %err, "password not sent");
                    }
                }
                None => self.notify(HubEvent::GetPassword),
            },
            SessionEffect::NotifyConnecting => self.notify(HubEvent::Connecting {
                hub_url: self.config.hub_url.clone(),
            }),
            SessionEffect::NotifyConnected => self.notify(HubEvent::Connected),
            SessionEffect::NotifyLoggedIn => self.notify(HubEvent::LoggedIn),
            SessionEffect::NotifyFailed { reason } => self.notify(HubEvent::Failed { reason }),
            SessionEffect::NotifyDisconnected => self.notify(HubEvent::Disconnected),
            SessionEffect::NotifyStatus { message } => {
                self.notify(HubEvent::StatusMessage(message))
            }
        }
    }

    fn notify(&self, event: HubEvent) {
        trace!(session = %self.id, event = event.name(), "notify");
        self.listeners.fire(|listener| event.deliver(listener));
    }

    fn send(&self, command: OutgoingCommand) -> Result<()> {
        let state = self.state();
        if !state.can_send() {
            debug!(session = %self.id, %state, "refusing to send");
            return Err(TransportError::Closed.into());
        }
        match self.transport.send(command) {
            Ok(()) => {
                self.touch();
                Ok(())
            }
            Err(err) => {
                self.on_transport_failed(err.to_string());
                Err(err.into())
            }
        }
    }

    fn dispatch(&self, request: SearchRequest) -> Result<()> {
        self.send(OutgoingCommand::Search(request.clone()))?;
        debug!(session = %self.id, token = request.token, "search dispatched");
        self.notify(HubEvent::SearchDispatched(request));
        Ok(())
    }

    fn handle_hub_features(&self, tokens: Vec<String>) {
        let decoded = self.hub_negotiator.decode_tokens(&tokens);
        let check = check_hub_features(self.config.dialect, &decoded.capabilities);
        {
            let mut state = self.state.lock();
            state.hub_features = Some(decoded.clone());
            if let HubFeatureCheck::Accepted { legacy_password } = check {
                state.legacy_password = legacy_password;
            }
        }

        self.directory.on_hub_features(&decoded);
        self.notify(HubEvent::HubUpdated(decoded));

        match check {
            HubFeatureCheck::MissingBaseProtocol => {
                self.apply(SessionEvent::ProtocolViolation {
                    reason: "Failed to negotiate base protocol".to_string(),
                });
            }
            HubFeatureCheck::Accepted {
                legacy_password: true,
            } => {
                self.notify(HubEvent::StatusMessage(
                    "Hub does not support Tiger hashing; using legacy password scheme"
                        .to_string(),
                ));
            }
            HubFeatureCheck::Accepted { .. } => {}
        }
    }

    fn handle_user_record(&self, record: UserRecord, now: Timestamp) {
        let capabilities = self
            .user_negotiator
            .map(|n| n.decode_tokens(&record.supports).capabilities)
            .unwrap_or_default();
        let user = HubUser {
            id: record.id,
            nick: record.nick,
            share_size: record.share_size,
            capabilities,
        };

        let outcome = self.users.lock().on_record(user, now);
        match outcome {
            RecordOutcome::Single(user) => self.notify(HubEvent::UserUpdated(user)),
            RecordOutcome::ListStarted => {
                debug!(session = %self.id, "receiving user list");
            }
            RecordOutcome::Buffered => {}
        }
    }

    fn finish_user_list(&self) {
        let batch = self.users.lock().complete();
        if let Some(users) = batch {
            info!(session = %self.id, users = users.len(), "user list loaded");
            self.notify(HubEvent::UserListUpdated(users));
        }
    }
}

impl core::fmt::Debug for HubSession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HubSession")
            .field("id", &self.id)
            .field("hub_url", &self.config.hub_url)
            .field("state", &self.state())
            .field("queued_searches", &self.scheduler.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::HubSessionError;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct NullTransport {
        sent: Mutex<Vec<OutgoingCommand>>,
    }

    impl HubTransport for NullTransport {
        fn connect(&self, _hub_url: &str) -> core::result::Result<(), TransportError> {
            Ok(())
        }

        fn send(&self, command: OutgoingCommand) -> core::result::Result<(), TransportError> {
            self.sent.lock().push(command);
            Ok(())
        }

        fn disconnect(&self, _graceful: bool) {}
    }

    struct Clock(AtomicU64);

    impl TimeSource for Clock {
        fn now(&self) -> Timestamp {
            Timestamp::new(self.0.load(Ordering::SeqCst))
        }
    }

    fn session() -> (HubSession, Arc<NullTransport>, Arc<Clock>) {
        let transport = Arc::new(NullTransport::default());
        let clock = Arc::new(Clock(AtomicU64::new(1_000)));
        let session = HubSession::new(SessionConfig::testing(), transport.clone())
            .with_time_source(clock.clone());
        (session, transport, clock)
    }

    fn log_in(session: &HubSession) {
        session.connect();
        session.on_transport_connected();
        session.on_signal(ProtocolSignal::HubFeatures {
            tokens: vec!["ADBASE".into(), "ADTIGR".into()],
        });
        session.on_signal(ProtocolSignal::ProtocolAccepted);
        session.on_signal(ProtocolSignal::IdentityAcknowledged);
    }

    #[test]
    fn test_new_session_is_idle() {
        let (session, transport, _) = session();
        assert_eq!(session.state(), ConnectionState::Connecting);
        assert!(session.is_connected());
        assert!(transport.sent.lock().is_empty());
    }

    #[test]
    fn test_login_reaches_normal() {
        let (session, transport, _) = session();
        log_in(&session);
        assert!(session.is_ready());
        assert!(!session.uses_legacy_password());
        assert!(matches!(
            transport.sent.lock().first(),
            Some(OutgoingCommand::Supports { .. })
        ));
        let trail = session.audit_trail();
        assert_eq!(trail.last().map(|e| e.to_state), Some(ConnectionState::Normal));
    }

    #[test]
    fn test_invalid_event_leaves_state() {
        let (session, _, _) = session();
        session.on_signal(ProtocolSignal::IdentityAcknowledged);
        assert_eq!(session.state(), ConnectionState::Connecting);

        assert!(session.disconnect(true));
        assert!(!session.on_transport_connected());
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_keepalive_after_idle() {
        let transport = Arc::new(NullTransport::default());
        let clock = Arc::new(Clock(AtomicU64::new(0)));
        let config = SessionConfig {
            keepalive_interval_ms: 1_000,
            ..SessionConfig::testing()
        };
        let session = HubSession::new(config, transport.clone()).with_time_source(clock.clone());
        log_in(&session);
        let before = transport.sent.lock().len();

        clock.0.store(500, Ordering::SeqCst);
        session.on_tick();
        assert_eq!(transport.sent.lock().len(), before);

        clock.0.store(1_000, Ordering::SeqCst);
        session.on_tick();
        assert_eq!(
            transport.sent.lock().last(),
            Some(&OutgoingCommand::KeepAlive)
        );
    }

    #[test]
    fn test_search_without_owner_rejected() {
        let (session, _, _) = session();
        assert!(matches!(
            session.search(SearchRequest::new("x")),
            Err(HubSessionError::Scheduler(SchedulerError::NoOwners))
        ));
    }

    #[test]
    fn test_search_before_login_is_queued() {
        let (session, transport, _) = session();
        let eta = session
            .search(SearchRequest::new("x").with_token(1).with_owner(OwnerId::new(1)))
            .unwrap();
        assert_eq!(eta, SearchEta::Queued { eta_ms: Some(0) });
        assert!(transport.sent.lock().is_empty());

        log_in(&session);
        session.on_tick();
        assert!(matches!(
            transport.sent.lock().last(),
            Some(OutgoingCommand::Search(r)) if r.filter == "x"
        ));
    }

    #[test]
    fn test_submit_password_requires_verify() {
        let (session, _, _) = session();
        assert!(matches!(
            session.submit_password("secret"),
            Err(HubSessionError::StateTransition(_))
        ));
    }
}
