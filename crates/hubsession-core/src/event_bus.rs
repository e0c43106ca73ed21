//! Listener fan-out
//!
//! `EventBus` keeps an ordered, duplicate-free registry of listener handles
//! and delivers notifications to a snapshot of it. The registry lock is held
//! only while the snapshot is copied, so listeners may add or remove
//! listeners (including themselves) from inside a callback.
//!
//! Listener obligation: callbacks must not panic and should return quickly.
//! The bus provides no per-listener fault isolation; a panicking listener
//! unwinds through the code that fired the event.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::errors::HubSessionError;

struct Registry<L: ?Sized> {
    listeners: Vec<Arc<L>>,
    shutting_down: bool,
}

/// Ordered, duplicate-free listener registry with snapshot delivery
pub struct EventBus<L: ?Sized> {
    registry: Mutex<Registry<L>>,
}

impl<L: ?Sized> EventBus<L> {
    /// Create an empty bus
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry {
                listeners: Vec::new(),
                shutting_down: false,
            }),
        }
    }

    /// Register a listener.
    ///
    /// Returns `Ok(false)` when the same handle is already registered, and
    /// `Err(ShuttingDown)` once [`begin_shutdown`](Self::begin_shutdown) has
    /// been called.
    pub fn add_listener(&self, listener: Arc<L>) -> Result<bool, HubSessionError> {
        let mut registry = self.registry.lock();
        if registry.shutting_down {
            return Err(HubSessionError::ShuttingDown);
        }
        if registry.listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return Ok(false);
        }
        registry.listeners.push(listener);
        trace!(count = registry.listeners.len(), "listener added");
        Ok(true)
    }

    /// Unregister a listener. Removing an absent handle is a no-op.
    pub fn remove_listener(&self, listener: &Arc<L>) -> bool {
        let mut registry = self.registry.lock();
        match registry
            .listeners
            .iter()
            .position(|l| Arc::ptr_eq(l, listener))
        {
            Some(index) => {
                registry.listeners.remove(index);
                trace!(count = registry.listeners.len(), "listener removed");
                true
            }
            None => false,
        }
    }

    /// Drop every registration
    pub fn remove_all(&self) {
        self.registry.lock().listeners.clear();
    }

    /// Reject all future registrations. Existing listeners keep receiving
    /// events until removed.
    pub fn begin_shutdown(&self) {
        self.registry.lock().shutting_down = true;
    }

    pub fn is_shutting_down(&self) -> bool {
        self.registry.lock().shutting_down
    }

    pub fn len(&self) -> usize {
        self.registry.lock().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current registrations in registration order
    pub fn snapshot(&self) -> Vec<Arc<L>> {
        self.registry.lock().listeners.clone()
    }

    /// Deliver an event to every listener registered at the moment of the
    /// call, in registration order, with the registry lock released.
    pub fn fire<F>(&self, mut deliver: F)
    where
        F: FnMut(&L),
    {
        let snapshot = self.snapshot();
        for listener in &snapshot {
            deliver(listener);
        }
    }
}

impl<L: ?Sized> Default for EventBus<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ?Sized> fmt::Debug for EventBus<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.lock();
        f.debug_struct("EventBus")
            .field("listeners", &registry.listeners.len())
            .field("shutting_down", &registry.shutting_down)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
