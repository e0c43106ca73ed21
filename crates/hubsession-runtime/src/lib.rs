//! Hub Session Runtime
//!
//! This crate wires a [`HubSession`](hubsession_core::HubSession) into a tokio
//! application:
//! - `RuntimeBuilder`: the composition root for a session and its collaborators
//! - `TickerTask`: the periodic timer that drives `on_tick`
//! - `ChannelListener`: forwards notifications into a bounded tokio channel
//! - `TokioTimeSource`: monotonic clock that follows tokio's (pausable) time

pub mod builder;
pub mod errors;
pub mod listener;
pub mod ticker;

pub use builder::{create_test_runtime, RuntimeBuilder, RuntimeHandle};
pub use errors::{RuntimeError, RuntimeResult};
pub use listener::{ChannelListener, EventReceiver};
pub use ticker::{TickerConfig, TickerTask, TokioTimeSource};

// Re-export core types for convenience
pub use hubsession_core::{
    ConnectionState, HubEvent, HubListener, HubSession, HubTransport, SearchEta, SearchRequest,
    SessionConfig, UserDirectory,
};
