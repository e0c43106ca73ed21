//! Rate-limited search scheduling
//!
//! Hubs require a minimum gap between searches from one client. Searches are
//! queued here, merged when two requests would produce the same query, and
//! released one at a time by [`SearchScheduler::pop`] once the gap since the
//! previous dispatch has elapsed.
//!
//! Ordering rules:
//! - manual searches (non-zero token) go ahead of every automatic one;
//! - a manual submission that matches a queued automatic search promotes
//!   that entry into the manual section, keeping every owner it had.
//!
//! Owners are opaque handles. A search lives as long as at least one owner
//! still wants it; [`SearchScheduler::cancel`] withdraws one owner.

use std::collections::{BTreeSet, VecDeque};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::SearchIntervalConfig;
use crate::errors::SchedulerError;
use crate::types::{OwnerId, Timestamp};

// ----------------------------------------------------------------------------
// Search Request
// ----------------------------------------------------------------------------

/// How `size` constrains results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SizeMode {
    #[default]
    Any,
    AtLeast,
    AtMost,
    Exact,
}

/// File category filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FileType {
    #[default]
    Any,
    Audio,
    Compressed,
    Document,
    Executable,
    Picture,
    Video,
    Directory,
    Tth,
    CdImage,
    Comics,
    Book,
}

/// Whether results come back directly or relayed through the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SearchMode {
    #[default]
    Active,
    Passive,
}

/// A search waiting to be sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub size_mode: SizeMode,
    pub size: u64,
    pub file_type: FileType,
    pub filter: String,
    pub filter_exclude: String,
    /// 0 marks an automatic search
    pub token: u32,
    #[serde(default)]
    pub owners: BTreeSet<OwnerId>,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub mode: SearchMode,
}

fn normalize_whitespace(text: &str) -> String {
    text.replace(['\t', '\r', '\n'], " ")
}

impl SearchRequest {
    /// Automatic, any-size, any-type search for `filter`
    pub fn new<T: AsRef<str>>(filter: T) -> Self {
        Self {
            size_mode: SizeMode::Any,
            size: 0,
            file_type: FileType::Any,
            filter: normalize_whitespace(filter.as_ref()),
            filter_exclude: String::new(),
            token: 0,
            owners: BTreeSet::new(),
            extensions: Vec::new(),
            mode: SearchMode::Active,
        }
    }

    pub fn with_size(mut self, size_mode: SizeMode, size: u64) -> Self {
        self.size_mode = size_mode;
        self.size = size;
        self
    }

    pub fn with_file_type(mut self, file_type: FileType) -> Self {
        self.file_type = file_type;
        self
    }

    pub fn with_exclude<T: AsRef<str>>(mut self, filter_exclude: T) -> Self {
        self.filter_exclude = normalize_whitespace(filter_exclude.as_ref());
        self
    }

    pub fn with_token(mut self, token: u32) -> Self {
        self.token = token;
        self
    }

    pub fn with_owner(mut self, owner: OwnerId) -> Self {
        self.owners.insert(owner);
        self
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Re-issued by the client itself rather than requested by a user
    pub fn is_automatic(&self) -> bool {
        self.token == 0
    }

    pub fn is_passive(&self) -> bool {
        self.mode == SearchMode::Passive
    }

    /// Whether both requests would send the same query.
    ///
    /// Compares size mode, size, file type and both filters; token, owners,
    /// extensions and mode do not take part.
    pub fn same_query(&self, other: &SearchRequest) -> bool {
        self.size_mode == other.size_mode
            && self.size == other.size
            && self.file_type == other.file_type
            && self.filter == other.filter
            && self.filter_exclude == other.filter_exclude
    }

    fn normalize(&mut self) {
        if self.filter.contains(['\t', '\r', '\n']) {
            self.filter = normalize_whitespace(&self.filter);
        }
        if self.filter_exclude.contains(['\t', '\r', '\n']) {
            self.filter_exclude = normalize_whitespace(&self.filter_exclude);
        }
    }
}

// ----------------------------------------------------------------------------
// Scheduler
// ----------------------------------------------------------------------------

#[derive(Debug)]
struct SchedulerState {
    queue: VecDeque<SearchRequest>,
    last_dispatch: Option<Timestamp>,
    last_was_passive: bool,
    intervals: SearchIntervalConfig,
}

impl SchedulerState {
    fn first_automatic(&self) -> usize {
        self.queue
            .iter()
            .position(SearchRequest::is_automatic)
            .unwrap_or(self.queue.len())
    }

    fn enqueue(&mut self, mut request: SearchRequest) -> bool {
        if let Some(index) = self.queue.iter().position(|e| e.same_query(&request)) {
            let promote = self.queue[index].is_automatic() && !request.is_automatic();
            if !promote {
                self.queue[index].owners.append(&mut request.owners);
                trace!(index, "search merged into queued entry");
                return false;
            }

            if let Some(mut existing) = self.queue.remove(index) {
                existing.owners.append(&mut request.owners);
                existing.token = request.token;
                existing.mode = request.mode;
                if !request.extensions.is_empty() {
                    existing.extensions = request.extensions;
                }
                let position = self.first_automatic();
                debug!(
                    token = existing.token,
                    from = index,
                    to = position,
                    "automatic search promoted by manual request"
                );
                self.queue.insert(position, existing);
            }
            return false;
        }

        if request.is_automatic() {
            self.queue.push_back(request);
        } else {
            let position = self.first_automatic();
            self.queue.insert(position, request);
        }
        trace!(queued = self.queue.len(), "search queued");
        true
    }

    /// Earliest time the gate opens, or `None` if nothing was sent yet
    fn gate_opens_at(&self) -> Option<Timestamp> {
        self.last_dispatch
            .map(|last| last + self.intervals.gap_after(self.last_was_passive))
    }
}

/// Deduplicating, interval-throttled search queue
#[derive(Debug)]
pub struct SearchScheduler {
    state: Mutex<SchedulerState>,
}

impl SearchScheduler {
    pub fn new(intervals: SearchIntervalConfig) -> Self {
        Self {
            state: Mutex::new(SchedulerState {
                queue: VecDeque::new(),
                last_dispatch: None,
                last_was_passive: false,
                intervals,
            }),
        }
    }

    /// Queue a search.
    ///
    /// Returns `Ok(true)` when a new entry was created and `Ok(false)` when
    /// the request merged into an existing one.
    pub fn add(&self, mut request: SearchRequest) -> Result<bool, SchedulerError> {
        if request.owners.is_empty() {
            return Err(SchedulerError::NoOwners);
        }
        request.normalize();
        Ok(self.state.lock().enqueue(request))
    }

    /// Take the head of the queue if the interval since the last dispatch
    /// has passed. The gate is open if nothing has been sent yet or the
    /// applicable interval is 0.
    pub fn pop(&self, now: Timestamp) -> Option<SearchRequest> {
        let mut state = self.state.lock();
        if state.queue.is_empty() {
            return None;
        }
        if let Some(opens_at) = state.gate_opens_at() {
            let gap = state.intervals.gap_after(state.last_was_passive);
            if gap != 0 && now <= opens_at {
                return None;
            }
        }

        let request = state.queue.pop_front()?;
        state.last_was_passive = request.is_passive();
        state.last_dispatch = Some(now);
        Some(request)
    }

    /// Claim a search for sending right away, bypassing the gate.
    ///
    /// If the same query is already queued the request merges into that
    /// entry as [`add`](Self::add) would and `Ok(None)` is returned, so a
    /// query never goes out twice. Otherwise the request is handed back and
    /// recorded as the latest dispatch.
    pub fn take_unqueued(
        &self,
        mut request: SearchRequest,
        now: Timestamp,
    ) -> Result<Option<SearchRequest>, SchedulerError> {
        if request.owners.is_empty() {
            return Err(SchedulerError::NoOwners);
        }
        request.normalize();

        let mut state = self.state.lock();
        if state.queue.iter().any(|e| e.same_query(&request)) {
            state.enqueue(request);
            return Ok(None);
        }
        state.last_was_passive = request.is_passive();
        state.last_dispatch = Some(now);
        Ok(Some(request))
    }

    /// Withdraw `owner` from the first entry that lists it, dropping the
    /// entry if it has no owners left. Returns whether an entry was found.
    pub fn cancel(&self, owner: OwnerId) -> bool {
        let mut state = self.state.lock();
        let Some(index) = state.queue.iter().position(|e| e.owners.contains(&owner)) else {
            return false;
        };
        let entry = &mut state.queue[index];
        entry.owners.remove(&owner);
        if entry.owners.is_empty() {
            state.queue.remove(index);
            trace!(%owner, "search cancelled");
        }
        true
    }

    /// Estimated dispatch time of the first manual search owned by `owner`.
    ///
    /// Returns `None` if the owner has nothing queued ahead of the automatic
    /// section.
    pub fn scheduled_time(&self, owner: OwnerId, now: Timestamp) -> Option<Timestamp> {
        let state = self.state.lock();
        let mut at = match state.gate_opens_at() {
            Some(opens_at) => opens_at.max(now),
            None => now,
        };
        for entry in &state.queue {
            if entry.is_automatic() || entry.owners.is_empty() {
                return None;
            }
            if entry.owners.contains(&owner) {
                return Some(at);
            }
            at = at + state.intervals.gap_after(entry.is_passive());
        }
        None
    }

    /// Replace the intervals; takes effect at the next `pop`
    pub fn set_intervals(&self, intervals: SearchIntervalConfig) {
        self.state.lock().intervals = intervals;
    }

    pub fn intervals(&self) -> SearchIntervalConfig {
        self.state.lock().intervals
    }

    pub fn last_dispatch(&self) -> Option<Timestamp> {
        self.state.lock().last_dispatch
    }

    /// Drop every queued search
    pub fn clear(&self) {
        self.state.lock().queue.clear();
    }

    /// True when at least one search is waiting
    pub fn has_queued(&self) -> bool {
        !self.state.lock().queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_queued()
    }

    /// Copy of the queue in dispatch order
    pub fn snapshot(&self) -> Vec<SearchRequest> {
        self.state.lock().queue.iter().cloned().collect()
    }
}

impl Default for SearchScheduler {
    fn default() -> Self {
        Self::new(SearchIntervalConfig::default())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(id: u64) -> OwnerId {
        OwnerId::new(id)
    }

    fn at(millis: u64) -> Timestamp {
        Timestamp::new(millis)
    }

    fn auto(filter: &str, owner_id: u64) -> SearchRequest {
        SearchRequest::new(filter).with_owner(owner(owner_id))
    }

    fn manual(filter: &str, token: u32, owner_id: u64) -> SearchRequest {
        auto(filter, owner_id).with_token(token)
    }

    fn filters(scheduler: &SearchScheduler) -> Vec<String> {
        scheduler.snapshot().into_iter().map(|r| r.filter).collect()
    }

    #[test]
    fn test_duplicate_query_merges_owners() {
        let scheduler = SearchScheduler::new(SearchIntervalConfig::unthrottled());

        assert_eq!(scheduler.add(manual("ubuntu iso", 7, 1)), Ok(true));
        assert_eq!(scheduler.add(manual("ubuntu iso", 8, 2)), Ok(false));

        let queued = scheduler.snapshot();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].owners, BTreeSet::from([owner(1), owner(2)]));
        // First submission's token stays
        assert_eq!(queued[0].token, 7);
    }

    #[test]
    fn test_key_ignores_token_mode_and_extensions() {
        let scheduler = SearchScheduler::new(SearchIntervalConfig::unthrottled());
        scheduler.add(manual("flac", 1, 1)).unwrap();
        let variant = manual("flac", 2, 2)
            .with_mode(SearchMode::Passive)
            .with_extensions(vec!["flac".to_string()]);
        assert_eq!(scheduler.add(variant), Ok(false));

        let different_size = manual("flac", 3, 3).with_size(SizeMode::AtLeast, 1024);
        assert_eq!(scheduler.add(different_size), Ok(true));
        assert_eq!(scheduler.len(), 2);
    }

    #[test]
    fn test_empty_owner_set_rejected() {
        let scheduler = SearchScheduler::default();
        assert_eq!(
            scheduler.add(SearchRequest::new("nobody")),
            Err(SchedulerError::NoOwners)
        );
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_manual_preempts_automatic() {
        let scheduler = SearchScheduler::new(SearchIntervalConfig::unthrottled());
        scheduler.add(auto("a1", 1)).unwrap();
        scheduler.add(auto("a2", 2)).unwrap();
        scheduler.add(manual("m", 9, 3)).unwrap();

        let dispatched: Vec<String> = (0..3)
            .filter_map(|i| scheduler.pop(at(i)))
            .map(|r| r.filter)
            .collect();
        assert_eq!(dispatched, vec!["m", "a1", "a2"]);
    }

    #[test]
    fn test_manual_searches_keep_fifo_order() {
        let scheduler = SearchScheduler::new(SearchIntervalConfig::unthrottled());
        scheduler.add(auto("a1", 1)).unwrap();
        scheduler.add(manual("m1", 1, 2)).unwrap();
        scheduler.add(manual("m2", 2, 3)).unwrap();
        assert_eq!(filters(&scheduler), vec!["m1", "m2", "a1"]);
    }

    #[test]
    fn test_promotion_preserves_owners() {
        let scheduler = SearchScheduler::new(SearchIntervalConfig::unthrottled());
        scheduler.add(auto("x", 1)).unwrap();
        scheduler.add(auto("other", 5)).unwrap();
        scheduler.add(auto("x", 2)).unwrap();
        scheduler.add(manual("m", 4, 6)).unwrap();

        // Manual request for the same query as the automatic "x"
        assert_eq!(
            scheduler.add(manual("x", 42, 3).with_mode(SearchMode::Passive)),
            Ok(false)
        );

        let queued = scheduler.snapshot();
        assert_eq!(filters(&scheduler), vec!["m", "x", "other"]);
        assert_eq!(
            queued[1].owners,
            BTreeSet::from([owner(1), owner(2), owner(3)])
        );
        assert_eq!(queued[1].token, 42);
        assert_eq!(queued[1].mode, SearchMode::Passive);
    }

    #[test]
    fn test_interval_gate() {
        let scheduler = SearchScheduler::new(SearchIntervalConfig::new(2_000, 3_000));
        scheduler.add(auto("one", 1)).unwrap();
        scheduler.add(auto("two", 1)).unwrap();
        scheduler.add(auto("three", 1)).unwrap();

        assert_eq!(scheduler.pop(at(1_000)).map(|r| r.filter), Some("one".into()));
        assert_eq!(scheduler.pop(at(1_500)), None);
        // Boundary is inclusive
        assert_eq!(scheduler.pop(at(3_000)), None);
        assert_eq!(scheduler.pop(at(4_001)).map(|r| r.filter), Some("two".into()));
    }

    #[test]
    fn test_passive_interval_applies_after_passive_search() {
        let scheduler = SearchScheduler::new(SearchIntervalConfig::new(2_000, 3_000));
        scheduler
            .add(auto("p", 1).with_mode(SearchMode::Passive))
            .unwrap();
        scheduler.add(auto("a", 1)).unwrap();

        assert!(scheduler.pop(at(0)).is_some());
        assert_eq!(scheduler.pop(at(2_500)), None);
        assert!(scheduler.pop(at(3_001)).is_some());
    }

    #[test]
    fn test_zero_interval_never_gates() {
        let scheduler = SearchScheduler::new(SearchIntervalConfig::unthrottled());
        scheduler.add(auto("a", 1)).unwrap();
        scheduler.add(auto("b", 1)).unwrap();
        assert!(scheduler.pop(at(5)).is_some());
        assert!(scheduler.pop(at(5)).is_some());
        assert_eq!(scheduler.pop(at(5)), None);
    }

    #[test]
    fn test_unqueued_dispatch_closes_gate() {
        let scheduler = SearchScheduler::new(SearchIntervalConfig::new(2_000, 2_000));
        scheduler.add(auto("queued", 1)).unwrap();
        let taken = scheduler.take_unqueued(manual("direct", 4, 2), at(10_000)).unwrap();
        assert_eq!(taken.map(|r| r.filter), Some("direct".to_string()));
        assert_eq!(scheduler.pop(at(11_000)), None);
        assert!(scheduler.pop(at(12_001)).is_some());
    }

    #[test]
    fn test_unqueued_dispatch_merges_into_queued_query() {
        let scheduler = SearchScheduler::new(SearchIntervalConfig::unthrottled());
        scheduler.add(auto("debian", 1)).unwrap();
        scheduler.add(auto("other", 3)).unwrap();

        let taken = scheduler.take_unqueued(manual("debian", 8, 2), at(0)).unwrap();
        assert_eq!(taken, None);
        assert_eq!(scheduler.last_dispatch(), None);

        let queue = scheduler.snapshot();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0].filter, "debian");
        assert_eq!(queue[0].token, 8);
        assert!(queue[0].owners.contains(&owner(1)) && queue[0].owners.contains(&owner(2)));

        assert_eq!(
            scheduler.take_unqueued(SearchRequest::new("x"), at(0)),
            Err(SchedulerError::NoOwners)
        );
    }

    #[test]
    fn test_cancel_removes_last_owner() {
        let scheduler = SearchScheduler::new(SearchIntervalConfig::unthrottled());
        scheduler.add(manual("solo", 1, 1)).unwrap();

        assert!(scheduler.cancel(owner(1)));
        assert!(!scheduler.has_queued());
        assert_eq!(scheduler.pop(at(0)), None);
        assert!(!scheduler.cancel(owner(1)));
    }

    #[test]
    fn test_cancel_keeps_shared_entry() {
        let scheduler = SearchScheduler::new(SearchIntervalConfig::unthrottled());
        scheduler.add(manual("shared", 1, 1)).unwrap();
        scheduler.add(manual("shared", 1, 2)).unwrap();

        assert!(scheduler.cancel(owner(1)));
        let queued = scheduler.snapshot();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].owners, BTreeSet::from([owner(2)]));
    }

    #[test]
    fn test_cancel_only_touches_first_entry() {
        let scheduler = SearchScheduler::new(SearchIntervalConfig::unthrottled());
        scheduler.add(manual("first", 1, 1)).unwrap();
        scheduler.add(manual("second", 2, 1)).unwrap();

        assert!(scheduler.cancel(owner(1)));
        assert_eq!(filters(&scheduler), vec!["second"]);
    }

    #[test]
    fn test_scheduled_time() {
        let scheduler = SearchScheduler::new(SearchIntervalConfig::new(2_000, 3_000));

        // Never dispatched: first entry is due now
        scheduler.add(manual("m1", 1, 1)).unwrap();
        scheduler
            .add(manual("m2", 2, 2).with_mode(SearchMode::Passive))
            .unwrap();
        scheduler.add(manual("m3", 3, 3)).unwrap();
        scheduler.add(auto("a", 4)).unwrap();

        assert_eq!(scheduler.scheduled_time(owner(1), at(100)), Some(at(100)));
        assert_eq!(scheduler.scheduled_time(owner(2), at(100)), Some(at(2_100)));
        assert_eq!(scheduler.scheduled_time(owner(3), at(100)), Some(at(5_100)));
        // Automatic entries have no estimate
        assert_eq!(scheduler.scheduled_time(owner(4), at(100)), None);
        assert_eq!(scheduler.scheduled_time(owner(99), at(100)), None);

        // After a dispatch the estimate starts when the gate opens
        scheduler.pop(at(1_000));
        assert_eq!(scheduler.scheduled_time(owner(2), at(1_500)), Some(at(3_000)));
        assert_eq!(scheduler.scheduled_time(owner(2), at(9_000)), Some(at(9_000)));
    }

    #[test]
    fn test_set_intervals_applies_to_next_pop() {
        let scheduler = SearchScheduler::new(SearchIntervalConfig::new(60_000, 60_000));
        scheduler.add(auto("a", 1)).unwrap();
        scheduler.add(auto("b", 1)).unwrap();
        scheduler.pop(at(0));
        assert_eq!(scheduler.pop(at(1_000)), None);

        scheduler.set_intervals(SearchIntervalConfig::new(500, 500));
        assert_eq!(scheduler.intervals(), SearchIntervalConfig::new(500, 500));
        assert!(scheduler.pop(at(1_000)).is_some());
    }

    #[test]
    fn test_whitespace_normalized_for_dedup() {
        let scheduler = SearchScheduler::new(SearchIntervalConfig::unthrottled());
        let mut raw = auto("", 1);
        raw.filter = "two\twords".to_string();
        scheduler.add(raw).unwrap();
        assert_eq!(scheduler.add(auto("two words", 2)), Ok(false));
        assert_eq!(filters(&scheduler), vec!["two words"]);
    }

    #[test]
    fn test_clear() {
        let scheduler = SearchScheduler::default();
        scheduler.add(auto("a", 1)).unwrap();
        scheduler.clear();
        assert_eq!(scheduler.len(), 0);
    }
}
