//! Hub Connection State Machine
//!
//! Pure transition function for the hub session lifecycle. Given the current
//! state and an event it yields the next state, the side effects the session
//! must run, and an audit entry. It performs no I/O and takes no locks; the
//! session applies the result.
//!
//! ```text
//! Connecting -> ProtocolSetup -> Identify -> [Verify] -> Normal <-> WaitPortTest
//!      any state --failure/close--> Disconnected --reconnect--> Connecting
//! ```

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

// ----------------------------------------------------------------------------
// Connection State Types
// ----------------------------------------------------------------------------

/// Lifecycle state of a hub session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Transport connection is being opened
    Connecting,
    /// Exchanging protocol features
    ProtocolSetup,
    /// Sending our identity
    Identify,
    /// Hub asked for a password
    Verify,
    /// Logged in
    Normal,
    /// No connection; only an explicit reconnect leaves this state
    Disconnected,
    /// Logged in, waiting for the result of a port reachability test
    WaitPortTest,
}

impl ConnectionState {
    /// Get current state name for logging/audit
    pub fn state_name(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "Connecting",
            ConnectionState::ProtocolSetup => "ProtocolSetup",
            ConnectionState::Identify => "Identify",
            ConnectionState::Verify => "Verify",
            ConnectionState::Normal => "Normal",
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::WaitPortTest => "WaitPortTest",
        }
    }

    pub fn is_connected(&self) -> bool {
        *self != ConnectionState::Disconnected
    }

    /// Logged in and able to search
    pub fn is_ready(&self) -> bool {
        *self == ConnectionState::Normal
    }

    /// Whether commands may be written to the transport
    pub fn can_send(&self) -> bool {
        !matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Disconnected
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.state_name())
    }
}

// ----------------------------------------------------------------------------
// State Transition Events
// ----------------------------------------------------------------------------

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Explicit request to (re)open the connection
    Reconnect,
    /// Transport reports the connection is open
    TransportConnected,
    /// Hub accepted our features and assigned us an identity
    ProtocolAccepted,
    PasswordRequested,
    PasswordAccepted,
    /// Hub echoed our identity back
    IdentityAcknowledged,
    PortTestStarted,
    PortTestFinished,
    TransportFailed { reason: String },
    ProtocolViolation { reason: String },
    /// Close on request
    Close { graceful: bool },
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Reconnect => "Reconnect",
            SessionEvent::TransportConnected => "TransportConnected",
            SessionEvent::ProtocolAccepted => "ProtocolAccepted",
            SessionEvent::PasswordRequested => "PasswordRequested",
            SessionEvent::PasswordAccepted => "PasswordAccepted",
            SessionEvent::IdentityAcknowledged => "IdentityAcknowledged",
            SessionEvent::PortTestStarted => "PortTestStarted",
            SessionEvent::PortTestFinished => "PortTestFinished",
            SessionEvent::TransportFailed { .. } => "TransportFailed",
            SessionEvent::ProtocolViolation { .. } => "ProtocolViolation",
            SessionEvent::Close { .. } => "Close",
        }
    }
}

// ----------------------------------------------------------------------------
// State Transition Results
// ----------------------------------------------------------------------------

/// Side effects requested by a transition, run in order by the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    CloseTransport { graceful: bool },
    OpenTransport,
    /// Forget per-connection data (user list, hub features)
    ResetSession,
    /// Discard a user list still being received
    DropUserList,
    SendLocalFeatures,
    /// Answer with a stored password or ask the user for one
    RequestPassword,
    NotifyConnecting,
    NotifyConnected,
    NotifyLoggedIn,
    NotifyFailed { reason: String },
    NotifyDisconnected,
    NotifyStatus { message: String },
}

/// Result of a state transition
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub new_state: ConnectionState,
    pub effects: Vec<SessionEffect>,
    pub audit_entry: AuditEntry,
}

/// Audit trail entry for state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: Timestamp,
    pub from_state: ConnectionState,
    pub to_state: ConnectionState,
    pub event: String,
    pub effects_count: usize,
}

// ----------------------------------------------------------------------------
// State Machine Implementation
// ----------------------------------------------------------------------------

impl ConnectionState {
    /// Process an event and compute the next state
    pub fn transition(
        self,
        event: SessionEvent,
        at: Timestamp,
    ) -> Result<StateTransition, StateTransitionError> {
        use ConnectionState::*;

        let event_name = event.name();
        let (new_state, effects) = match (self, event) {
            (from, SessionEvent::Reconnect) => {
                let mut effects = Vec::with_capacity(4);
                if from != Disconnected {
                    effects.push(SessionEffect::CloseTransport { graceful: false });
                }
                effects.push(SessionEffect::ResetSession);
                effects.push(SessionEffect::NotifyConnecting);
                effects.push(SessionEffect::OpenTransport);
                (Connecting, effects)
            }

            (Connecting, SessionEvent::TransportConnected) => (
                ProtocolSetup,
                vec![
                    SessionEffect::NotifyConnected,
                    SessionEffect::SendLocalFeatures,
                ],
            ),

            (ProtocolSetup, SessionEvent::ProtocolAccepted) => (Identify, Vec::new()),

            (Identify, SessionEvent::PasswordRequested) => {
                (Verify, vec![SessionEffect::RequestPassword])
            }

            (Verify, SessionEvent::PasswordAccepted)
            | (Identify | Verify, SessionEvent::IdentityAcknowledged) => {
                (Normal, vec![SessionEffect::NotifyLoggedIn])
            }

            // Repeated acknowledgement after login
            (Normal, SessionEvent::IdentityAcknowledged) => (Normal, Vec::new()),

            (Normal, SessionEvent::PortTestStarted) => (
                WaitPortTest,
                vec![SessionEffect::NotifyStatus {
                    message: "Waiting for port test".to_string(),
                }],
            ),

            (WaitPortTest, SessionEvent::PortTestFinished) => (
                Normal,
                vec![SessionEffect::NotifyStatus {
                    message: "Port test finished".to_string(),
                }],
            ),

            // Disconnected absorbs failures and closes without effect
            (
                Disconnected,
                SessionEvent::TransportFailed { .. }
                | SessionEvent::ProtocolViolation { .. }
                | SessionEvent::Close { .. },
            ) => (Disconnected, Vec::new()),

            // Universal transitions
            (
                _,
                SessionEvent::TransportFailed { reason }
                | SessionEvent::ProtocolViolation { reason },
            ) => (
                Disconnected,
                vec![
                    SessionEffect::CloseTransport { graceful: false },
                    SessionEffect::DropUserList,
                    SessionEffect::NotifyFailed { reason },
                ],
            ),

            (_, SessionEvent::Close { graceful }) => (
                Disconnected,
                vec![
                    SessionEffect::CloseTransport { graceful },
                    SessionEffect::DropUserList,
                    SessionEffect::NotifyDisconnected,
                ],
            ),

            // Invalid transitions
            (from, event) => {
                return Err(StateTransitionError::InvalidTransition {
                    from_state: from.state_name().to_string(),
                    event: event_name.to_string(),
                    reason: format!("Event {:?} not valid for state {}", event, from),
                });
            }
        };

        let audit_entry = AuditEntry {
            timestamp: at,
            from_state: self,
            to_state: new_state,
            event: event_name.to_string(),
            effects_count: effects.len(),
        };

        Ok(StateTransition {
            new_state,
            effects,
            audit_entry,
        })
    }
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors that can occur during state transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateTransitionError {
    /// Event arrived in a state that does not accept it
    #[error("Invalid transition from {from_state} on event {event}: {reason}")]
    InvalidTransition {
        from_state: String,
        event: String,
        reason: String,
    },
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
