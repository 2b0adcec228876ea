//! Time Source Abstraction
//!
//! Every component that needs "now" or has to wait goes through [`Clock`],
//! so tests can run the admission engine on tokio's paused timer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use std::time::Duration;

/// Source of the current time and of timed waits
#[async_trait]
pub trait Clock: Send + Sync + Debug {
    /// Current wall-clock time
    fn now(&self) -> DateTime<Utc>;

    /// Suspend the calling task for `duration`
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Wall clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a fixed origin that moves with tokio's timer.
///
/// Under `#[tokio::test(start_paused = true)]` time only moves through
/// `tokio::time::advance` or auto-advance, so `now()` and every `sleep`
/// stay in lockstep.
#[derive(Debug, Clone)]
pub struct MockClock {
    origin: DateTime<Utc>,
    anchor: tokio::time::Instant,
}

impl MockClock {
    /// Create a clock reading `origin` at the current tokio instant
    pub fn new(origin: DateTime<Utc>) -> Self {
        Self {
            origin,
            anchor: tokio::time::Instant::now(),
        }
    }

    /// Create a clock starting at the given Unix timestamp (seconds)
    pub fn from_unix_secs(secs: i64) -> Self {
        Self::new(DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH))
    }

    /// Time elapsed since the clock was created
    pub fn elapsed(&self) -> Duration {
        self.anchor.elapsed()
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.anchor.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.origin + elapsed
    }
}
