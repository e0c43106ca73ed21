//! Bulk user-list detection
//!
//! Right after login a hub floods the client with one record per connected
//! user. Announcing each of those individually would swamp consumers, so the
//! tracker buffers the flood and releases it as a single batch when the list
//! ends. The start is implicit (the first record); the end is an explicit
//! marker, any other kind of traffic, or a period of silence.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::Timestamp;

/// Phase of the initial user list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BulkListState {
    AwaitingFirstRecord,
    InBulkList,
    BulkListComplete,
}

/// What the caller should do with a record it just handed over
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome<R> {
    /// First record of the list; buffered
    ListStarted,
    /// Part of the ongoing flood; buffered
    Buffered,
    /// Steady-state update; announce it on its own
    Single(R),
}

/// Three-state flood detector that batches the initial list
#[derive(Debug, Clone)]
pub struct BulkListTracker<R> {
    state: BulkListState,
    buffer: Vec<R>,
    last_record: Option<Timestamp>,
}

impl<R> BulkListTracker<R> {
    pub fn new() -> Self {
        Self {
            state: BulkListState::AwaitingFirstRecord,
            buffer: Vec::new(),
            last_record: None,
        }
    }

    pub fn state(&self) -> BulkListState {
        self.state
    }

    /// True while the initial flood is being buffered
    pub fn is_loading(&self) -> bool {
        self.state == BulkListState::InBulkList
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Feed one record
    pub fn on_record(&mut self, record: R, now: Timestamp) -> RecordOutcome<R> {
        self.last_record = Some(now);
        match self.state {
            BulkListState::AwaitingFirstRecord => {
                self.state = BulkListState::InBulkList;
                self.buffer.push(record);
                debug!("user list started");
                RecordOutcome::ListStarted
            }
            BulkListState::InBulkList => {
                self.buffer.push(record);
                RecordOutcome::Buffered
            }
            BulkListState::BulkListComplete => RecordOutcome::Single(record),
        }
    }

    /// End the flood. Returns the whole batch the first time it is called
    /// during a list and `None` in every other state.
    pub fn complete(&mut self) -> Option<Vec<R>> {
        if self.state != BulkListState::InBulkList {
            return None;
        }
        self.state = BulkListState::BulkListComplete;
        let batch = std::mem::take(&mut self.buffer);
        debug!(users = batch.len(), "user list complete");
        Some(batch)
    }

    /// Complete the list if no record has arrived for `idle_ms`.
    /// An `idle_ms` of 0 disables inactivity inference.
    pub fn complete_if_idle(&mut self, now: Timestamp, idle_ms: u64) -> Option<Vec<R>> {
        if idle_ms == 0 || self.state != BulkListState::InBulkList {
            return None;
        }
        match self.last_record {
            Some(last) if now - last >= idle_ms => self.complete(),
            _ => None,
        }
    }

    /// Back to `AwaitingFirstRecord`, dropping anything buffered
    pub fn reset(&mut self) {
        self.state = BulkListState::AwaitingFirstRecord;
        self.buffer.clear();
        self.last_record = None;
    }
}

impl<R> Default for BulkListTracker<R> {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
