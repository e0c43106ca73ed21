//! Channel Listener
//!
//! Listener callbacks run synchronously on whichever thread caused the
//! notification. `ChannelListener` turns them into `HubEvent` values on a
//! bounded tokio channel so async consumers can `recv().await` them. The
//! callback never blocks: when the channel is full the event is dropped and
//! counted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hubsession_core::{
    ConnectionState, DecodedFeatures, HubEvent, HubListener, HubUser, SearchRequest,
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{trace, warn};

/// Receiving end of a [`ChannelListener`]
pub type EventReceiver = mpsc::Receiver<HubEvent>;

/// Listener that forwards every notification into a tokio channel
#[derive(Debug)]
pub struct ChannelListener {
    sender: mpsc::Sender<HubEvent>,
    dropped: AtomicU64,
}

impl ChannelListener {
    /// Create a listener and the receiver its events arrive on.
    /// `buffer_size` must be non-zero.
    pub fn new(buffer_size: usize) -> (Arc<Self>, EventReceiver) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let listener = Arc::new(Self {
            sender,
            dropped: AtomicU64::new(0),
        });
        (listener, receiver)
    }

    /// Events lost because the channel was full
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn forward(&self, event: HubEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(event = event.name(), "event channel full, dropping event");
            }
            Err(TrySendError::Closed(event)) => {
                trace!(event = event.name(), "event receiver gone");
            }
        }
    }
}

impl HubListener for ChannelListener {
    fn on_connecting(&self, hub_url: &str) {
        self.forward(HubEvent::Connecting {
            hub_url: hub_url.to_string(),
        });
    }

    fn on_connected(&self) {
        self.forward(HubEvent::Connected);
    }

    fn on_logged_in(&self) {
        self.forward(HubEvent::LoggedIn);
    }

    fn on_failed(&self, reason: &str) {
        self.forward(HubEvent::Failed {
            reason: reason.to_string(),
        });
    }

    fn on_disconnected(&self) {
        self.forward(HubEvent::Disconnected);
    }

    fn on_state_changed(&self, from: ConnectionState, to: ConnectionState) {
        self.forward(HubEvent::StateChanged { from, to });
    }

    fn on_user_updated(&self, user: &HubUser) {
        self.forward(HubEvent::UserUpdated(user.clone()));
    }

    fn on_user_list_updated(&self, users: &[HubUser]) {
        self.forward(HubEvent::UserListUpdated(users.to_vec()));
    }

    fn on_user_removed(&self, user_id: &str) {
        self.forward(HubEvent::UserRemoved {
            user_id: user_id.to_string(),
        });
    }

    fn on_hub_updated(&self, features: &DecodedFeatures) {
        self.forward(HubEvent::HubUpdated(features.clone()));
    }

    fn on_get_password(&self) {
        self.forward(HubEvent::GetPassword);
    }

    fn on_status_message(&self, message: &str) {
        self.forward(HubEvent::StatusMessage(message.to_string()));
    }

    fn on_search_dispatched(&self, request: &SearchRequest) {
        self.forward(HubEvent::SearchDispatched(request.clone()));
    }
}
