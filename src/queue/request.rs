//! Admission Requests

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::clock::Clock;

/// Request priority. Lower values are served first.
pub type Priority = i32;

/// Priority used when none can be resolved for a request (the highest)
pub const DEFAULT_PRIORITY: Priority = 0;

/// A single admission attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    id: String,
    priority: Priority,
    enqueued_at: DateTime<Utc>,
}

impl Request {
    /// Create a request arriving now according to `clock`
    pub fn new(id: impl Into<String>, priority: Priority, clock: &dyn Clock) -> Self {
        Self::at(id, priority, clock.now())
    }

    /// Create a request with an explicit arrival time
    pub fn at(id: impl Into<String>, priority: Priority, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            priority,
            enqueued_at,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }

    /// Point in time after which the request may no longer be admitted
    pub fn deadline(&self, ttl: Duration) -> DateTime<Utc> {
        chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| self.enqueued_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
