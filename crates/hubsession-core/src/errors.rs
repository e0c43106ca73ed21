//! Error types for the hub session engine
//!
//! Each component reports its own narrow error type; `HubSessionError`
//! unifies them for callers that drive a whole session.

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Search scheduler misuse
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("Search request has no owners")]
    NoOwners,
}

/// Errors reported by a transport collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Connection to {address} failed: {reason}")]
    ConnectFailed { address: String, reason: String },
    #[error("Send failed: {reason}")]
    SendFailed { reason: String },
    #[error("Transport is closed")]
    Closed,
}

/// Invalid configuration values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} of {value}ms exceeds the maximum of {max}ms")]
    IntervalTooLarge {
        field: &'static str,
        value: u64,
        max: u64,
    },
    #[error("Invalid configuration: {reason}")]
    Invalid { reason: String },
}

// ----------------------------------------------------------------------------
// Unified Error Type
// ----------------------------------------------------------------------------

/// Core error type for hub session operations
#[derive(Debug, thiserror::Error)]
pub enum HubSessionError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("State transition error: {0}")]
    StateTransition(#[from] crate::connection_state::StateTransitionError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Listener registration attempted after shutdown began
    #[error("Listener registry is shutting down")]
    ShuttingDown,
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl HubSessionError {
    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        HubSessionError::Configuration(ConfigError::Invalid {
            reason: reason.into(),
        })
    }

    /// Create a transport send error with a reason
    pub fn send_failed<T: Into<String>>(reason: T) -> Self {
        HubSessionError::Transport(TransportError::SendFailed {
            reason: reason.into(),
        })
    }

    /// Create a transport connection failed error
    pub fn connect_failed<A: Into<String>, R: Into<String>>(address: A, reason: R) -> Self {
        HubSessionError::Transport(TransportError::ConnectFailed {
            address: address.into(),
            reason: reason.into(),
        })
    }
}
