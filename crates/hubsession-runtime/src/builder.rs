//! Runtime Builder API
//!
//! Provides a builder-style API for consumers (CLI/tests) to assemble a hub
//! session with its transport, directory and clock, start the ticker, and get
//! back a handle with an event receiver.

use std::sync::Arc;

use hubsession_core::{
    HubListener, HubSession, HubTransport, SearchEta, SearchRequest, SessionConfig, TimeSource,
    UserDirectory,
};
use tokio::{sync::mpsc, task::JoinHandle, time::Duration};
use tracing::{info, warn};

use crate::errors::{RuntimeError, RuntimeResult};
use crate::listener::{ChannelListener, EventReceiver};
use crate::ticker::{TickerConfig, TickerTask, TokioTimeSource};

const DEFAULT_EVENT_BUFFER_SIZE: usize = 1000;

// ----------------------------------------------------------------------------
// Runtime Builder
// ----------------------------------------------------------------------------

/// Builder for a hub session runtime
pub struct RuntimeBuilder {
    config: SessionConfig,
    ticker: TickerConfig,
    transport: Option<Arc<dyn HubTransport>>,
    directory: Option<Arc<dyn UserDirectory>>,
    time_source: Option<Arc<dyn TimeSource>>,
    listeners: Vec<Arc<dyn HubListener>>,
    event_buffer_size: usize,
    connect_on_start: bool,
}

impl RuntimeBuilder {
    /// Create a new runtime builder
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            ticker: TickerConfig::default(),
            transport: None,
            directory: None,
            time_source: None,
            listeners: Vec::new(),
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            connect_on_start: true,
        }
    }

    /// Set the byte-level transport (required)
    pub fn with_transport(mut self, transport: Arc<dyn HubTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_directory(mut self, directory: Arc<dyn UserDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Override the clock. Defaults to [`TokioTimeSource`].
    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = Some(time_source);
        self
    }

    /// Register a listener before the session starts
    pub fn add_listener(mut self, listener: Arc<dyn HubListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Configure the ticker
    pub fn with_ticker(mut self, ticker: TickerConfig) -> Self {
        self.ticker = ticker;
        self
    }

    /// Set tick interval. A zero duration means manual ticks; any other
    /// period shorter than a millisecond is rounded up to one.
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        let millis = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self.ticker.tick_interval_ms = if millis == 0 && !interval.is_zero() {
            1
        } else {
            millis
        };
        self
    }

    /// Set the event channel buffer size
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }

    /// Whether `build_and_start` opens the connection
    pub fn connect_on_start(mut self, enabled: bool) -> Self {
        self.connect_on_start = enabled;
        self
    }

    /// Build and start the runtime
    pub async fn build_and_start(self) -> RuntimeResult<RuntimeHandle> {
        self.config.validate()?;
        self.ticker.validate()?;
        if self.event_buffer_size == 0 {
            return Err(RuntimeError::Configuration(
                hubsession_core::ConfigError::Invalid {
                    reason: "event_buffer_size must be greater than zero".to_string(),
                },
            ));
        }
        let transport = self.transport.ok_or(RuntimeError::MissingTransport)?;

        info!(hub = %self.config.hub_url, dialect = ?self.config.dialect, "building hub session runtime");

        let time_source = self
            .time_source
            .unwrap_or_else(|| Arc::new(TokioTimeSource::new()));
        let mut session = HubSession::new(self.config, transport).with_time_source(time_source);
        if let Some(directory) = self.directory {
            session = session.with_directory(directory);
        }
        let session = Arc::new(session);

        let (channel_listener, event_receiver) = ChannelListener::new(self.event_buffer_size);
        session.add_listener(channel_listener.clone())?;
        for listener in self.listeners {
            session.add_listener(listener)?;
        }

        let (shutdown_sender, ticker_handle) = if self.ticker.is_enabled() {
            let (sender, receiver) = mpsc::channel(1);
            let task = TickerTask::new(session.clone(), self.ticker.tick_interval(), receiver);
            (Some(sender), Some(tokio::spawn(task.run())))
        } else {
            (None, None)
        };

        if self.connect_on_start {
            session.connect();
        }

        info!(session = %session.id(), "hub session runtime started");

        Ok(RuntimeHandle {
            session,
            channel_listener,
            event_receiver: Some(event_receiver),
            ticker_handle,
            shutdown_sender,
            running: true,
        })
    }
}

// ----------------------------------------------------------------------------
// Runtime Handle
// ----------------------------------------------------------------------------

/// Handle to a running hub session
pub struct RuntimeHandle {
    session: Arc<HubSession>,
    channel_listener: Arc<ChannelListener>,
    event_receiver: Option<EventReceiver>,
    ticker_handle: Option<JoinHandle<RuntimeResult<u64>>>,
    shutdown_sender: Option<mpsc::Sender<()>>,
    running: bool,
}

impl RuntimeHandle {
    /// The session this runtime drives
    pub fn session(&self) -> Arc<HubSession> {
        self.session.clone()
    }

    /// Take the event receiver (can only be called once)
    pub fn take_event_receiver(&mut self) -> Option<EventReceiver> {
        self.event_receiver.take()
    }

    /// Events lost because the receiver fell behind
    pub fn dropped_events(&self) -> u64 {
        self.channel_listener.dropped_events()
    }

    /// Submit a search through the session
    pub fn search(&self, request: SearchRequest) -> RuntimeResult<SearchEta> {
        Ok(self.session.search(request)?)
    }

    /// Check if the runtime is still running
    pub fn is_running(&self) -> bool {
        self.running
            && self
                .ticker_handle
                .as_ref()
                .map_or(true, |h| !h.is_finished())
    }

    /// Shutdown the runtime gracefully: close the connection, stop accepting
    /// listeners and stop the ticker.
    pub async fn shutdown(&mut self) -> RuntimeResult<()> {
        if !self.running {
            return Ok(());
        }
        info!(session = %self.session.id(), "shutting down hub session runtime");

        if self.session.state() != hubsession_core::ConnectionState::Disconnected {
            self.session.disconnect(true);
        }
        self.session.listeners().begin_shutdown();

        if let Some(sender) = self.shutdown_sender.take() {
            let _ = sender.send(()).await;
        }
        if let Some(handle) = self.ticker_handle.take() {
            match tokio::time::timeout(Duration::from_secs(10), handle).await {
                Ok(Ok(result)) => {
                    result?;
                }
                Ok(Err(e)) => {
                    self.running = false;
                    return Err(RuntimeError::task_failed(format!(
                        "Ticker task panicked: {}",
                        e
                    )));
                }
                Err(_) => warn!(session = %self.session.id(), "ticker did not stop in time"),
            }
        }

        self.running = false;
        info!(session = %self.session.id(), "hub session runtime shut down");
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Convenience Functions
// ----------------------------------------------------------------------------

/// Create a runtime with test configuration that does not connect on start
pub async fn create_test_runtime(transport: Arc<dyn HubTransport>) -> RuntimeResult<RuntimeHandle> {
    RuntimeBuilder::new(SessionConfig::testing())
        .with_transport(transport)
        .with_ticker(TickerConfig::testing())
        .event_buffer_size(100)
        .connect_on_start(false)
        .build_and_start()
        .await
}
