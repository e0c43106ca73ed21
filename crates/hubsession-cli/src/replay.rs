//! Script Replay
//!
//! Drives a hub session from a JSON-lines script instead of a live hub. Each
//! line is one [`ScriptStep`]; after every step the commands the session
//! wrote and the notifications it raised are printed as JSON records.
//!
//! Time only moves when the script says so (`advance`), and `on_tick` only
//! runs on `tick` steps, so a replay is fully deterministic.
//!
//! ```text
//! {"step":"connect"}
//! {"step":"transport_connected"}
//! {"step":"signal","signal":{"type":"hub_features","tokens":["ADBASE","ADTIGR"]}}
//! {"step":"search","filter":"ubuntu iso","token":7,"owner":1}
//! {"step":"advance","ms":1000}
//! {"step":"tick"}
//! ```

use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hubsession_core::{
    ConnectionState, HubSession, HubTransport, OutgoingCommand, OwnerId, ProtocolSignal,
    SearchIntervalConfig, SearchMode, SearchRequest, TimeSource, Timestamp, TransportError,
};
use hubsession_runtime::{EventReceiver, RuntimeBuilder, RuntimeHandle, TickerConfig};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// Script Format
// ----------------------------------------------------------------------------

/// One line of a replay script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ScriptStep {
    /// Open (or reopen) the connection
    Connect,
    /// The transport finished connecting
    TransportConnected,
    TransportFailed {
        reason: String,
    },
    /// Parsed hub traffic
    Signal {
        signal: ProtocolSignal,
    },
    Search {
        filter: String,
        #[serde(default)]
        token: u32,
        owner: u64,
        #[serde(default)]
        passive: bool,
    },
    Cancel {
        owner: u64,
    },
    Password {
        password: String,
    },
    SetIntervals {
        interval_ms: u64,
        interval_passive_ms: u64,
    },
    /// Move the clock forward
    Advance {
        ms: u64,
    },
    Tick,
    Disconnect {
        #[serde(default = "default_graceful")]
        graceful: bool,
    },
}

fn default_graceful() -> bool {
    true
}

/// What a replay did, printed as the final record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub steps: usize,
    pub commands_sent: usize,
    pub events: usize,
    pub errors: usize,
    pub final_state: ConnectionState,
}

// ----------------------------------------------------------------------------
// Script Collaborators
// ----------------------------------------------------------------------------

/// Clock that only moves on `advance` steps
#[derive(Debug, Clone, Default)]
struct ScriptClock(Arc<AtomicU64>);

impl ScriptClock {
    fn advance(&self, millis: u64) -> u64 {
        self.0.fetch_add(millis, Ordering::SeqCst) + millis
    }
}

impl TimeSource for ScriptClock {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.0.load(Ordering::SeqCst))
    }
}

/// Transport that captures what the session asks for
#[derive(Debug, Default)]
struct ScriptTransport {
    pending: Mutex<Vec<Value>>,
}

impl ScriptTransport {
    fn take(&self) -> Vec<Value> {
        std::mem::take(&mut *self.pending.lock())
    }
}

impl HubTransport for ScriptTransport {
    fn connect(&self, hub_url: &str) -> std::result::Result<(), TransportError> {
        self.pending.lock().push(json!({ "connect": hub_url }));
        Ok(())
    }

    fn send(&self, command: OutgoingCommand) -> std::result::Result<(), TransportError> {
        let value = serde_json::to_value(&command).map_err(|e| TransportError::SendFailed {
            reason: e.to_string(),
        })?;
        self.pending.lock().push(json!({ "sent": value }));
        Ok(())
    }

    fn disconnect(&self, graceful: bool) {
        self.pending
            .lock()
            .push(json!({ "disconnect": { "graceful": graceful } }));
    }
}

// ----------------------------------------------------------------------------
// Replayer
// ----------------------------------------------------------------------------

/// Replays script steps against a session and writes the results to `out`
pub struct Replayer<W: Write> {
    runtime: RuntimeHandle,
    session: Arc<HubSession>,
    events: EventReceiver,
    transport: Arc<ScriptTransport>,
    clock: ScriptClock,
    out: W,
    pretty: bool,
    steps: usize,
    commands_sent: usize,
    event_count: usize,
    errors: usize,
}

impl<W: Write> Replayer<W> {
    /// Build a session for `config` with a scripted transport and clock.
    /// The background ticker is disabled; use `tick` steps instead.
    pub async fn start(config: &AppConfig, out: W) -> Result<Self> {
        let transport = Arc::new(ScriptTransport::default());
        let clock = ScriptClock::default();

        let mut runtime = RuntimeBuilder::new(config.session.clone())
            .with_transport(transport.clone())
            .with_time_source(Arc::new(clock.clone()))
            .with_ticker(TickerConfig::manual())
            .connect_on_start(false)
            .build_and_start()
            .await?;
        let events = runtime
            .take_event_receiver()
            .ok_or_else(|| CliError::Config("event receiver already taken".to_string()))?;
        let session = runtime.session();

        info!(session = %session.id(), hub = %config.session.hub_url, "replay session ready");

        Ok(Self {
            runtime,
            session,
            events,
            transport,
            clock,
            out,
            pretty: config.output.pretty,
            steps: 0,
            commands_sent: 0,
            event_count: 0,
            errors: 0,
        })
    }

    /// Run every step read from `reader`. Blank lines and lines starting with
    /// `#` are skipped.
    pub fn run_script<R: BufRead>(&mut self, reader: R) -> Result<()> {
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let text = line.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }
            let step: ScriptStep =
                serde_json::from_str(text).map_err(|e| CliError::Script {
                    line: index + 1,
                    reason: e.to_string(),
                })?;
            self.run_step(index + 1, step)?;
        }
        Ok(())
    }

    /// Apply one step and print what it caused. Session errors are printed
    /// and counted rather than aborting the replay.
    pub fn run_step(&mut self, line: usize, step: ScriptStep) -> Result<()> {
        debug!(line, ?step, "replaying step");
        self.steps += 1;

        if let Err(err) = self.apply(step) {
            warn!(line, %err, "step failed");
            self.errors += 1;
            self.write(json!({ "line": line, "error": err.to_string() }))?;
        }
        self.flush(Some(line))
    }

    /// Shut the session down, print the summary and return it
    pub async fn finish(mut self) -> Result<ReplaySummary> {
        self.runtime.shutdown().await?;
        self.flush(None)?;

        let summary = ReplaySummary {
            steps: self.steps,
            commands_sent: self.commands_sent,
            events: self.event_count,
            errors: self.errors,
            final_state: self.session.state(),
        };
        self.write(json!({ "summary": summary }))?;
        self.out.flush()?;
        Ok(summary)
    }

    fn apply(&mut self, step: ScriptStep) -> Result<()> {
        let session = self.session.clone();
        match step {
            ScriptStep::Connect => {
                session.connect();
            }
            ScriptStep::TransportConnected => {
                session.on_transport_connected();
            }
            ScriptStep::TransportFailed { reason } => {
                session.on_transport_failed(reason);
            }
            ScriptStep::Signal { signal } => session.on_signal(signal),
            ScriptStep::Search {
                filter,
                token,
                owner,
                passive,
            } => {
                let mode = if passive {
                    SearchMode::Passive
                } else {
                    SearchMode::Active
                };
                let request = SearchRequest::new(filter)
                    .with_token(token)
                    .with_owner(OwnerId::new(owner))
                    .with_mode(mode);
                let eta = session.search(request)?;
                self.write(json!({ "search": { "owner": owner, "eta": eta } }))?;
            }
            ScriptStep::Cancel { owner } => {
                let cancelled = session.cancel_search(OwnerId::new(owner));
                self.write(json!({ "cancel": { "owner": owner, "found": cancelled } }))?;
            }
            ScriptStep::Password { password } => session.submit_password(password)?,
            ScriptStep::SetIntervals {
                interval_ms,
                interval_passive_ms,
            } => {
                session
                    .set_search_intervals(SearchIntervalConfig::new(interval_ms, interval_passive_ms))?;
            }
            ScriptStep::Advance { ms } => {
                let now = self.clock.advance(ms);
                debug!(now, "clock advanced");
            }
            ScriptStep::Tick => session.on_tick(),
            ScriptStep::Disconnect { graceful } => {
                session.disconnect(graceful);
            }
        }
        Ok(())
    }

    fn flush(&mut self, line: Option<usize>) -> Result<()> {
        for action in self.transport.take() {
            if action.get("sent").is_some() {
                self.commands_sent += 1;
            }
            self.write(json!({ "line": line, "transport": action }))?;
        }
        while let Ok(event) = self.events.try_recv() {
            self.event_count += 1;
            self.write(json!({ "line": line, "event": event }))?;
        }
        Ok(())
    }

    fn write(&mut self, record: Value) -> Result<()> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.out, &record)?;
        } else {
            serde_json::to_writer(&mut self.out, &record)?;
        }
        writeln!(self.out)?;
        Ok(())
    }
}
