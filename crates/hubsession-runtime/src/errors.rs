//! Runtime error types

use hubsession_core::{ConfigError, HubSessionError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Session error: {0}")]
    Session(#[from] HubSessionError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("No transport was supplied to the runtime builder")]
    MissingTransport,

    #[error("Runtime task failed: {reason}")]
    TaskFailed { reason: String },
}

impl RuntimeError {
    pub fn task_failed<T: Into<String>>(reason: T) -> Self {
        Self::TaskFailed {
            reason: reason.into(),
        }
    }
}

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;
