//! Session notifications
//!
//! [`HubListener`] is the callback interface consumers implement; every
//! method has a no-op default so a consumer only overrides what it cares
//! about. [`HubEvent`] carries the same notifications as owned values for
//! consumers that would rather receive them over a channel.

use serde::{Deserialize, Serialize};

use crate::connection_state::ConnectionState;
use crate::features::DecodedFeatures;
use crate::search::SearchRequest;
use crate::session::HubUser;

// ----------------------------------------------------------------------------
// Listener Interface
// ----------------------------------------------------------------------------

/// Observer of a hub session
pub trait HubListener: Send + Sync {
    /// A connection attempt to `hub_url` is starting
    fn on_connecting(&self, _hub_url: &str) {}
    /// The transport is up and protocol setup begins
    fn on_connected(&self) {}
    /// The session reached `Normal`
    fn on_logged_in(&self) {}
    /// The session dropped to `Disconnected` because of an error
    fn on_failed(&self, _reason: &str) {}
    /// The session was closed on request
    fn on_disconnected(&self) {}
    /// Any lifecycle state change
    fn on_state_changed(&self, _from: ConnectionState, _to: ConnectionState) {}
    /// A single user record arrived outside the initial list
    fn on_user_updated(&self, _user: &HubUser) {}
    /// The initial user list finished loading
    fn on_user_list_updated(&self, _users: &[HubUser]) {}
    fn on_user_removed(&self, _user_id: &str) {}
    /// The hub announced its features
    fn on_hub_updated(&self, _features: &DecodedFeatures) {}
    /// The hub asked for a password and none is stored
    fn on_get_password(&self) {}
    fn on_status_message(&self, _message: &str) {}
    /// A search left the queue and was handed to the transport
    fn on_search_dispatched(&self, _request: &SearchRequest) {}
}

// ----------------------------------------------------------------------------
// Event Values
// ----------------------------------------------------------------------------

/// Owned form of every listener notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HubEvent {
    Connecting { hub_url: String },
    Connected,
    LoggedIn,
    Failed { reason: String },
    Disconnected,
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    UserUpdated(HubUser),
    UserListUpdated(Vec<HubUser>),
    UserRemoved { user_id: String },
    HubUpdated(DecodedFeatures),
    GetPassword,
    StatusMessage(String),
    SearchDispatched(SearchRequest),
}

impl HubEvent {
    /// Invoke the matching listener method
    pub fn deliver(&self, listener: &dyn HubListener) {
        match self {
            HubEvent::Connecting { hub_url } => listener.on_connecting(hub_url),
            HubEvent::Connected => listener.on_connected(),
            HubEvent::LoggedIn => listener.on_logged_in(),
            HubEvent::Failed { reason } => listener.on_failed(reason),
            HubEvent::Disconnected => listener.on_disconnected(),
            HubEvent::StateChanged { from, to } => listener.on_state_changed(*from, *to),
            HubEvent::UserUpdated(user) => listener.on_user_updated(user),
            HubEvent::UserListUpdated(users) => listener.on_user_list_updated(users),
            HubEvent::UserRemoved { user_id } => listener.on_user_removed(user_id),
            HubEvent::HubUpdated(features) => listener.on_hub_updated(features),
            HubEvent::GetPassword => listener.on_get_password(),
            HubEvent::StatusMessage(message) => listener.on_status_message(message),
            HubEvent::SearchDispatched(request) => listener.on_search_dispatched(request),
        }
    }

    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            HubEvent::Connecting { .. } => "Connecting",
            HubEvent::Connected => "Connected",
            HubEvent::LoggedIn => "LoggedIn",
            HubEvent::Failed { .. } => "Failed",
            HubEvent::Disconnected => "Disconnected",
            HubEvent::StateChanged { .. } => "StateChanged",
            HubEvent::UserUpdated(_) => "UserUpdated",
            HubEvent::UserListUpdated(_) => "UserListUpdated",
            HubEvent::UserRemoved { .. } => "UserRemoved",
            HubEvent::HubUpdated(_) => "HubUpdated",
            HubEvent::GetPassword => "GetPassword",
            HubEvent::StatusMessage(_) => "StatusMessage",
            HubEvent::SearchDispatched(_) => "SearchDispatched",
        }
    }
}
