//! Periodic Ticker
//!
//! Drives [`HubSession::on_tick`] from a tokio interval until shut down.

use std::sync::Arc;

use hubsession_core::{ConfigError, HubSession, TimeSource, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::errors::RuntimeResult;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Ticker configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickerConfig {
    /// Period between `on_tick` calls. 0 disables the ticker; the owner then
    /// calls `on_tick` itself.
    pub tick_interval_ms: u64,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
        }
    }
}

impl TickerConfig {
    /// Fast ticks for tests
    pub fn testing() -> Self {
        Self {
            tick_interval_ms: 10,
        }
    }

    /// No background ticker
    pub fn manual() -> Self {
        Self {
            tick_interval_ms: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.tick_interval_ms != 0
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms > 60_000 {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "tick_interval_ms of {} is longer than a minute",
                    self.tick_interval_ms
                ),
            });
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Time Source
// ----------------------------------------------------------------------------

/// Milliseconds elapsed since creation on tokio's clock.
///
/// Monotonic, and frozen along with tokio time in paused tests.
#[derive(Debug, Clone, Copy)]
pub struct TokioTimeSource {
    origin: Instant,
}

impl TokioTimeSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for TokioTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for TokioTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.origin.elapsed().as_millis() as u64)
    }
}

// ----------------------------------------------------------------------------
// Ticker Task
// ----------------------------------------------------------------------------

/// Calls `on_tick` on a fixed period
pub struct TickerTask {
    session: Arc<HubSession>,
    period: Duration,
    shutdown: mpsc::Receiver<()>,
    ticks: u64,
}

impl TickerTask {
    pub fn new(session: Arc<HubSession>, period: Duration, shutdown: mpsc::Receiver<()>) -> Self {
        Self {
            session,
            period,
            shutdown,
            ticks: 0,
        }
    }

    /// Run until a shutdown message arrives or every sender is dropped.
    /// Returns the number of ticks performed.
    pub async fn run(mut self) -> RuntimeResult<u64> {
        info!(session = %self.session.id(), period_ms = self.period.as_millis() as u64, "ticker starting");

        let mut ticks = interval(self.period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    self.session.on_tick();
                    self.ticks += 1;
                }
                _ = self.shutdown.recv() => {
                    debug!(session = %self.session.id(), "ticker shutdown requested");
                    break;
                }
            }
        }

        info!(session = %self.session.id(), ticks = self.ticks, "ticker stopped");
        Ok(self.ticks)
    }
}
