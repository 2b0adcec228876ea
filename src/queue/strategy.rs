//! Queue Strategy and Identity
//!
//! A [`Strategy`] is the quota/window policy of a queue; together with the
//! remedy name it forms the [`AdmissionKey`] a queue is registered under.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Rate-limiting policy: at most `window_quota` admissions per window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Strategy {
    /// Requests admitted per window
    pub window_quota: u32,

    /// Window length
    pub window_size: Duration,
}

impl Strategy {
    /// Create a new strategy
    pub fn new(window_quota: u32, window_size: Duration) -> Self {
        Self {
            window_quota,
            window_size,
        }
    }

    /// Window length in microseconds, never below one
    fn window_micros(&self) -> i64 {
        i64::try_from(self.window_size.as_micros())
            .unwrap_or(i64::MAX)
            .max(1)
    }

    /// Index of the window containing `at`, counted from the Unix epoch.
    ///
    /// All strategies with the same window size share boundaries.
    pub fn window_index(&self, at: DateTime<Utc>) -> i64 {
        at.timestamp_micros().div_euclid(self.window_micros())
    }

    /// Start time of the window with the given index
    pub fn window_start(&self, index: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_micros(index.saturating_mul(self.window_micros()))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} per {:?}", self.window_quota, self.window_size)
    }
}

/// Identity of a queue instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdmissionKey {
    /// Name of the remedy owning the queue
    pub remedy_name: String,

    /// Policy the queue enforces
    pub strategy: Strategy,
}

impl AdmissionKey {
    /// Create a new admission key
    pub fn new(remedy_name: impl Into<String>, strategy: Strategy) -> Self {
        Self {
            remedy_name: remedy_name.into(),
            strategy,
        }
    }
}
