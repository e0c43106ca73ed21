//! Integration tests for the hub session runtime
//!
//! The runtime's default clock follows tokio time, so these tests run with
//! paused time and let the ticker advance it deterministically.

use std::sync::Arc;
use std::time::Duration;

use hubsession_core::{
    ConnectionState, HubEvent, HubListener, HubSessionError, HubTransport, OutgoingCommand,
    OwnerId, ProtocolSignal, SearchEta, SearchIntervalConfig, SearchRequest, SessionConfig,
    TransportError,
};
use hubsession_runtime::{
    create_test_runtime, RuntimeBuilder, RuntimeError, RuntimeHandle, TickerConfig,
};
use parking_lot::Mutex;
use tokio::time::timeout;
use tokio_test::assert_ok;

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<OutgoingCommand>>,
    closed: Mutex<Option<bool>>,
}

impl RecordingTransport {
    fn searches(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|command| match command {
                OutgoingCommand::Search(request) => Some(request.filter.clone()),
                _ => None,
            })
            .collect()
    }
}

impl HubTransport for RecordingTransport {
    fn connect(&self, _hub_url: &str) -> Result<(), TransportError> {
        Ok(())
    }

    fn send(&self, command: OutgoingCommand) -> Result<(), TransportError> {
        self.sent.lock().push(command);
        Ok(())
    }

    fn disconnect(&self, graceful: bool) {
        *self.closed.lock() = Some(graceful);
    }
}

fn log_in(runtime: &RuntimeHandle) {
    let session = runtime.session();
    session.on_transport_connected();
    session.on_signal(ProtocolSignal::HubFeatures {
        tokens: vec!["ADBASE".to_string(), "ADTIGR".to_string()],
    });
    session.on_signal(ProtocolSignal::ProtocolAccepted);
    session.on_signal(ProtocolSignal::IdentityAcknowledged);
}

fn manual(filter: &str, token: u32) -> SearchRequest {
    SearchRequest::new(filter)
        .with_token(token)
        .with_owner(OwnerId::new(token as u64))
}

async fn throttled_runtime(transport: Arc<RecordingTransport>) -> RuntimeHandle {
    let config = SessionConfig {
        search: SearchIntervalConfig::new(100, 100),
        ..SessionConfig::testing()
    };
    RuntimeBuilder::new(config)
        .with_transport(transport)
        .with_ticker(TickerConfig::testing())
        .build_and_start()
        .await
        .expect("Failed to build runtime")
}

// ----------------------------------------------------------------------------
// Ticker Driven Dispatch
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_ticker_paces_queued_searches() {
    let transport = Arc::new(RecordingTransport::default());
    let mut runtime = throttled_runtime(transport.clone()).await;
    log_in(&runtime);

    for (i, filter) in ["one", "two", "three"].iter().enumerate() {
        let eta = runtime.search(manual(filter, i as u32 + 1)).unwrap();
        assert!(matches!(eta, SearchEta::Queued { .. }));
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.searches(), vec!["one"]);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.searches(), vec!["one", "two"]);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(transport.searches(), vec!["one", "two", "three"]);

    assert_ok!(runtime.shutdown().await);
}

#[tokio::test(start_paused = true)]
async fn test_ticker_ends_idle_user_list() {
    let transport = Arc::new(RecordingTransport::default());
    let mut runtime = throttled_runtime(transport).await;
    let mut events = runtime.take_event_receiver().unwrap();
    log_in(&runtime);

    runtime
        .session()
        .on_signal(ProtocolSignal::UserRecord(hubsession_core::UserRecord {
            id: "AAAA".to_string(),
            nick: "alice".to_string(),
            share_size: 1 << 30,
            supports: vec!["TCP4".to_string()],
        }));

    // testing() ends a list after 100ms without records
    tokio::time::sleep(Duration::from_millis(150)).await;

    let mut batch = None;
    while let Ok(event) = events.try_recv() {
        if let HubEvent::UserListUpdated(users) = event {
            batch = Some(users);
        }
    }
    let users = batch.expect("user list should have been announced");
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].nick, "alice");

    assert_ok!(runtime.shutdown().await);
}

// ----------------------------------------------------------------------------
// Event Delivery
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_login_events_reach_receiver() {
    let transport = Arc::new(RecordingTransport::default());
    let mut runtime = throttled_runtime(transport).await;
    let mut events = runtime.take_event_receiver().unwrap();
    log_in(&runtime);

    let mut names = Vec::new();
    while names.last() != Some(&"LoggedIn") {
        let event = timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("event should arrive within timeout")
            .expect("channel open");
        if event.name() != "StateChanged" {
            names.push(event.name());
        }
    }
    assert_eq!(names, vec!["Connecting", "Connected", "HubUpdated", "LoggedIn"]);
    assert_eq!(runtime.dropped_events(), 0);

    assert_ok!(runtime.shutdown().await);
}

#[tokio::test(start_paused = true)]
async fn test_builder_listeners_are_registered() {
    #[derive(Default)]
    struct Counter(Mutex<u32>);
    impl HubListener for Counter {
        fn on_logged_in(&self) {
            *self.0.lock() += 1;
        }
    }

    let counter = Arc::new(Counter::default());
    let mut runtime = RuntimeBuilder::new(SessionConfig::testing())
        .with_transport(Arc::new(RecordingTransport::default()))
        .add_listener(counter.clone())
        .build_and_start()
        .await
        .unwrap();
    log_in(&runtime);

    assert_eq!(*counter.0.lock(), 1);
    assert_ok!(runtime.shutdown().await);
}

#[tokio::test(start_paused = true)]
async fn test_slow_receiver_loses_events() {
    let mut runtime = RuntimeBuilder::new(SessionConfig::testing())
        .with_transport(Arc::new(RecordingTransport::default()))
        .with_ticker(TickerConfig::manual())
        .event_buffer_size(2)
        .build_and_start()
        .await
        .unwrap();
    log_in(&runtime);

    assert!(runtime.dropped_events() > 0);
    assert_ok!(runtime.shutdown().await);
}

// ----------------------------------------------------------------------------
// Shutdown
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_gracefully() {
    let transport = Arc::new(RecordingTransport::default());
    let mut runtime = throttled_runtime(transport.clone()).await;
    log_in(&runtime);

    assert_ok!(runtime.shutdown().await);

    assert!(!runtime.is_running());
    assert_eq!(runtime.session().state(), ConnectionState::Disconnected);
    assert_eq!(*transport.closed.lock(), Some(true));

    let late: Arc<dyn HubListener> = Arc::new(LateListener);
    assert!(matches!(
        runtime.session().add_listener(late),
        Err(HubSessionError::ShuttingDown)
    ));

    // A second shutdown is a no-op
    assert_ok!(runtime.shutdown().await);
}

struct LateListener;

impl HubListener for LateListener {}

#[tokio::test(start_paused = true)]
async fn test_test_runtime_waits_for_connect() {
    let transport = Arc::new(RecordingTransport::default());
    let mut runtime = create_test_runtime(transport.clone()).await.unwrap();

    assert_eq!(runtime.session().state(), ConnectionState::Connecting);
    let result = runtime.search(SearchRequest::new("no owner"));
    assert!(matches!(
        result,
        Err(RuntimeError::Session(HubSessionError::Scheduler(_)))
    ));

    runtime.session().connect();
    log_in(&runtime);
    let eta = runtime.search(manual("now", 7)).unwrap();
    assert_eq!(eta, SearchEta::Sent);
    assert_eq!(transport.searches(), vec!["now"]);

    assert_ok!(runtime.shutdown().await);
}
