//! Priority-ordered wait list
//!
//! Entries are served by ascending priority, then arrival time, then
//! insertion order. Per-priority counts are kept alongside so observers can
//! snapshot queue depth without walking the entries.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::request::Priority;

/// Position of an entry in the wait list
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WaitKey {
    priority: Priority,
    enqueued_at: DateTime<Utc>,
    seq: u64,
}

impl WaitKey {
    pub fn priority(&self) -> Priority {
        self.priority
    }
}

/// Ordered collection of waiting entries
#[derive(Debug)]
pub struct WaitList<T> {
    entries: BTreeMap<WaitKey, T>,
    counts: BTreeMap<Priority, usize>,
    next_seq: u64,
}

impl<T> WaitList<T> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            counts: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Insert an entry and return its key
    pub fn push(&mut self, priority: Priority, enqueued_at: DateTime<Utc>, value: T) -> WaitKey {
        let key = WaitKey {
            priority,
            enqueued_at,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.entries.insert(key, value);
        *self.counts.entry(priority).or_insert(0) += 1;
        key
    }

    /// Remove and return the entry that should be served next
    pub fn pop_first(&mut self) -> Option<(WaitKey, T)> {
        let (key, value) = self.entries.pop_first()?;
        self.decrement(key.priority);
        Some((key, value))
    }

    /// Remove a specific entry, if it is still waiting
    pub fn remove(&mut self, key: &WaitKey) -> Option<T> {
        let value = self.entries.remove(key)?;
        self.decrement(key.priority);
        Some(value)
    }

    pub fn contains(&self, key: &WaitKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of waiting entries per priority
    pub fn counts(&self) -> BTreeMap<Priority, usize> {
        self.counts.clone()
    }

    /// Remove every entry in service order
    pub fn drain(&mut self) -> impl Iterator<Item = (WaitKey, T)> {
        self.counts.clear();
        std::mem::take(&mut self.entries).into_iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn decrement(&mut self, priority: Priority) {
        if let Some(count) = self.counts.get_mut(&priority) {
            *count -= 1;
            if *count == 0 {
                self.counts.remove(&priority);
            }
        }
    }
}

impl<T> Default for WaitList<T> {
    fn default() -> Self {
        Self::new()
    }
}
