//! Hub Session Protocol Engine
//!
//! This crate provides the per-connection machinery of a hub client: the
//! connection lifecycle state machine, capability feature negotiation,
//! bulk user-list detection, the rate-limited search scheduler and the
//! listener fan-out that announces all of it to the rest of the application.
//!
//! Every operation is synchronous and short-lived. Byte-level transport and
//! line parsing live outside the crate behind the [`HubTransport`] and
//! [`UserDirectory`] traits and the [`ProtocolSignal`] vocabulary.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod bulk_list;
pub mod config;
pub mod connection_state;
pub mod errors;
pub mod event_bus;
pub mod events;
pub mod features;
pub mod search;
pub mod session;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use bulk_list::{BulkListState, BulkListTracker, RecordOutcome};
pub use config::{Dialect, SearchIntervalConfig, SessionConfig};
pub use connection_state::{
    AuditEntry, ConnectionState, SessionEffect, SessionEvent, StateTransition,
    StateTransitionError,
};
pub use errors::{ConfigError, HubSessionError, SchedulerError, TransportError};
pub use event_bus::EventBus;
pub use events::{HubEvent, HubListener};
pub use features::{CapabilitySet, DecodedFeatures, FeatureNegotiator, Vocabulary};
pub use search::{FileType, SearchMode, SearchRequest, SearchScheduler, SizeMode};
pub use session::{
    DefaultDirectory, HubSession, HubTransport, HubUser, OutgoingCommand, ProtocolSignal,
    SearchEta, UserDirectory, UserRecord,
};
pub use types::{OwnerId, SessionId, SystemTimeSource, TimeSource, Timestamp};

/// Result type for hub session operations
pub type Result<T> = core::result::Result<T, HubSessionError>;
