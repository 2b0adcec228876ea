//! Admission Queue
//!
//! Per-key engine deciding whether a request may proceed in the current
//! quota window, has to wait for a later one, or is rejected once its TTL
//! passes.
//!
//! Window accounting is lazy: every entry point recomputes the window index
//! from the clock and rolls over when it moved. Parked callers sleep until
//! their own deadline only; one rollover driver task per queue wakes at each
//! window boundary while anyone is waiting and promotes the best waiters
//! into the fresh quota.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use super::request::{Priority, Request};
use super::strategy::Strategy;
use super::wait_list::{WaitKey, WaitList};
use crate::clock::Clock;

/// Point-in-time view of a queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Policy enforced by the queue
    pub strategy: Strategy,

    /// Start of the window the queue last observed
    pub window_start: DateTime<Utc>,

    /// Requests admitted in that window
    pub admitted: u32,

    /// Waiting requests per priority
    pub waiting: BTreeMap<Priority, usize>,

    /// Whether the queue has been closed
    pub closed: bool,
}

/// A parked caller
#[derive(Debug)]
struct Waiter {
    request_id: String,
    deadline: DateTime<Utc>,
    verdict: oneshot::Sender<bool>,
}

#[derive(Debug)]
struct QueueState {
    window_index: i64,
    admitted: u32,
    waiting: WaitList<Waiter>,
    driver_active: bool,
    closed: bool,
}

struct QueueInner {
    strategy: Strategy,
    clock: Arc<dyn Clock>,
    state: Mutex<QueueState>,
}

/// Priority-aware, window-aligned admission queue.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct AdmissionQueue {
    inner: Arc<QueueInner>,
}

impl AdmissionQueue {
    /// Create a queue enforcing `strategy`
    pub fn new(strategy: Strategy, clock: Arc<dyn Clock>) -> Self {
        let window_index = strategy.window_index(clock.now());
        Self {
            inner: Arc::new(QueueInner {
                strategy,
                clock,
                state: Mutex::new(QueueState {
                    window_index,
                    admitted: 0,
                    waiting: WaitList::new(),
                    driver_active: false,
                    closed: false,
                }),
            }),
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.inner.strategy
    }

    /// Whether both handles refer to the same queue
    pub fn same_queue(&self, other: &AdmissionQueue) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Admit `request` now, or wait up to `ttl` for a later window.
    ///
    /// Returns `true` once the request is admitted and `false` when its TTL
    /// passes first or the queue is closed. A zero `ttl` never waits.
    pub async fn enqueue(&self, request: Request, ttl: Duration) -> bool {
        let deadline = request.deadline(ttl);

        let (key, mut verdict) = {
            let mut state = self.inner.state.lock();
            let now = self.inner.clock.now();
            self.roll_window(&mut state, now);

            if !state.closed && state.admitted < self.inner.strategy.window_quota {
                state.admitted += 1;
                trace!(
                    request_id = %request.id(),
                    priority = request.priority(),
                    admitted = state.admitted,
                    "admitted immediately"
                );
                return true;
            }

            if state.closed || ttl.is_zero() || now >= deadline {
                trace!(request_id = %request.id(), "quota exhausted, no time left to wait");
                return false;
            }

            let (tx, rx) = oneshot::channel();
            let key = state.waiting.push(
                request.priority(),
                request.enqueued_at(),
                Waiter {
                    request_id: request.id().to_string(),
                    deadline,
                    verdict: tx,
                },
            );
            trace!(
                request_id = %request.id(),
                priority = request.priority(),
                waiting = state.waiting.len(),
                "quota exhausted, waiting"
            );
            self.ensure_driver(&mut state);
            (key, rx)
        };

        // Dropping this call before a verdict takes the request out of line.
        let _guard = WaitGuard { queue: &self.inner, key };

        loop {
            let sleep_for = (deadline - self.inner.clock.now())
                .to_std()
                .unwrap_or(Duration::ZERO);

            tokio::select! {
                biased;
                outcome = &mut verdict => return outcome.unwrap_or(false),
                () = self.inner.clock.sleep(sleep_for) => {}
            }

            let mut state = self.inner.state.lock();
            let now = self.inner.clock.now();
            self.roll_window(&mut state, now);

            if !state.waiting.contains(&key) {
                // Decided while we were waking up; the verdict is already sent.
                drop(state);
                return verdict.try_recv().unwrap_or(false);
            }

            if now >= deadline {
                state.waiting.remove(&key);
                debug!(
                    request_id = %request.id(),
                    priority = request.priority(),
                    "ttl passed before admission"
                );
                return false;
            }
        }
    }

    /// Number of waiting requests per priority
    pub fn counts(&self) -> BTreeMap<Priority, usize> {
        self.inner.state.lock().waiting.counts()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.inner.state.lock();
        QueueSnapshot {
            strategy: self.inner.strategy,
            window_start: self.inner.strategy.window_start(state.window_index),
            admitted: state.admitted,
            waiting: state.waiting.counts(),
            closed: state.closed,
        }
    }

    /// Reject every waiting request and any later request that would wait
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;

        let mut released = 0usize;
        for (_, waiter) in state.waiting.drain() {
            let _ = waiter.verdict.send(false);
            released += 1;
        }
        debug!(strategy = %self.inner.strategy, released, "queue closed");
    }

    /// Start a new window if `now` has moved past the current one, then
    /// promote waiters into the fresh quota
    fn roll_window(&self, state: &mut QueueState, now: DateTime<Utc>) {
        let index = self.inner.strategy.window_index(now);
        if index <= state.window_index {
            return;
        }

        state.window_index = index;
        state.admitted = 0;

        while state.admitted < self.inner.strategy.window_quota {
            let Some((key, waiter)) = state.waiting.pop_first() else {
                break;
            };

            if waiter.deadline <= now {
                trace!(request_id = %waiter.request_id, "discarding expired waiter");
                let _ = waiter.verdict.send(false);
                continue;
            }

            // A closed receiver means the caller went away; its slot stays free.
            if waiter.verdict.send(true).is_ok() {
                state.admitted += 1;
                trace!(
                    request_id = %waiter.request_id,
                    priority = key.priority(),
                    admitted = state.admitted,
                    "promoted on window rollover"
                );
            }
        }
    }

    /// Spawn the rollover driver unless one is already running
    fn ensure_driver(&self, state: &mut QueueState) {
        if state.driver_active {
            return;
        }
        state.driver_active = true;

        let queue = self.clone();
        tokio::spawn(async move { queue.drive_rollovers().await });
    }

    /// Wake at every window boundary while requests are waiting
    async fn drive_rollovers(self) {
        let mut driver = DriverGuard {
            queue: &self.inner,
            stopped: false,
        };

        loop {
            let boundary = {
                let mut state = self.inner.state.lock();
                if state.closed || state.waiting.is_empty() {
                    state.driver_active = false;
                    driver.stopped = true;
                    return;
                }
                self.inner.strategy.window_start(state.window_index + 1)
            };

            let sleep_for = (boundary - self.inner.clock.now())
                .to_std()
                .unwrap_or(Duration::ZERO);
            self.inner.clock.sleep(sleep_for).await;

            let mut state = self.inner.state.lock();
            let now = self.inner.clock.now();
            self.roll_window(&mut state, now);
        }
    }
}

impl fmt::Debug for AdmissionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionQueue")
            .field("strategy", &self.inner.strategy)
            .finish_non_exhaustive()
    }
}

/// Removes a waiter whose caller stopped polling
struct WaitGuard<'a> {
    queue: &'a QueueInner,
    key: WaitKey,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.queue.state.lock().waiting.remove(&self.key);
    }
}

/// Lets a new driver start if the running one is cancelled mid-sleep
struct DriverGuard<'a> {
    queue: &'a QueueInner,
    stopped: bool,
}

impl Drop for DriverGuard<'_> {
    fn drop(&mut self) {
        if !self.stopped {
            self.queue.state.lock().driver_active = false;
        }
    }
}
