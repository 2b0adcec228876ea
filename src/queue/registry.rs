//! Queue Registry
//!
//! Maps each (remedy, strategy) pair to its single [`AdmissionQueue`].
//! Queues are created on first use and live for the rest of the process.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::admission::{AdmissionQueue, QueueSnapshot};
use super::strategy::AdmissionKey;
use crate::clock::Clock;

/// Snapshot of one registered queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredQueue {
    /// Remedy owning the queue
    pub remedy_name: String,

    /// Queue state
    #[serde(flatten)]
    pub queue: QueueSnapshot,
}

/// Concurrent map of admission queues
#[derive(Debug, Clone)]
pub struct QueueRegistry {
    queues: Arc<DashMap<AdmissionKey, AdmissionQueue>>,
    clock: Arc<dyn Clock>,
}

impl QueueRegistry {
    /// Create an empty registry whose queues use `clock`
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            queues: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Get the queue for `key`, creating it on first use.
    ///
    /// Concurrent first calls for the same key all receive the same queue.
    pub fn get_or_create(&self, key: AdmissionKey) -> AdmissionQueue {
        if let Some(queue) = self.queues.get(&key) {
            return queue.value().clone();
        }

        let remedy_name = key.remedy_name.clone();
        let strategy = key.strategy;
        self.queues
            .entry(key)
            .or_insert_with(|| {
                debug!(remedy = %remedy_name, %strategy, "initialized admission queue");
                AdmissionQueue::new(strategy, self.clock.clone())
            })
            .value()
            .clone()
    }

    /// Get the queue for `key` if it exists
    pub fn get(&self, key: &AdmissionKey) -> Option<AdmissionQueue> {
        self.queues.get(key).map(|queue| queue.value().clone())
    }

    /// Visit every queue.
    ///
    /// Handles are copied out first, so no map shard stays locked while
    /// `visit` runs.
    pub fn for_each<F>(&self, mut visit: F)
    where
        F: FnMut(&AdmissionKey, &AdmissionQueue),
    {
        let entries: Vec<(AdmissionKey, AdmissionQueue)> = self
            .queues
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        for (key, queue) in &entries {
            visit(key, queue);
        }
    }

    /// Snapshot every queue, ordered by remedy name
    pub fn snapshot(&self) -> Vec<RegisteredQueue> {
        let mut snapshots = Vec::with_capacity(self.len());
        self.for_each(|key, queue| {
            snapshots.push(RegisteredQueue {
                remedy_name: key.remedy_name.clone(),
                queue: queue.snapshot(),
            });
        });
        snapshots.sort_by(|a, b| {
            a.remedy_name
                .cmp(&b.remedy_name)
                .then(a.queue.strategy.window_quota.cmp(&b.queue.strategy.window_quota))
                .then(a.queue.strategy.window_size.cmp(&b.queue.strategy.window_size))
        });
        snapshots
    }

    /// Close every queue, releasing all waiting callers
    pub fn close_all(&self) {
        self.for_each(|_, queue| queue.close());
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{MockClock, SystemClock};
    use crate::queue::{Request, Strategy};
    use std::time::Duration;

    fn registry() -> QueueRegistry {
        QueueRegistry::new(Arc::new(SystemClock))
    }

    fn key(name: &str, quota: u32) -> AdmissionKey {
        AdmissionKey::new(name, Strategy::new(quota, Duration::from_secs(60)))
    }

    #[test]
    fn test_registry_starts_empty() {
        let registry = registry();
        assert!(registry.is_empty());
        assert!(registry.get(&key("a", 1)).is_none());
    }

    #[test]
    fn test_get_or_create_returns_same_queue() {
        let registry = registry();
        let first = registry.get_or_create(key("remedy", 5));
        let second = registry.get_or_create(key("remedy", 5));

        assert!(first.same_queue(&second));
        assert!(registry.get(&key("remedy", 5)).unwrap().same_queue(&first));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_distinct_keys_get_distinct_queues() {
        let registry = registry();
        let a = registry.get_or_create(key("remedy", 5));
        let b = registry.get_or_create(key("remedy", 6));
        let c = registry.get_or_create(key("other", 5));

        assert!(!a.same_queue(&b));
        assert!(!a.same_queue(&c));
        assert_eq!(registry.len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_access_creates_one_queue() {
        let registry = registry();

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get_or_create(key("racy", 3)) })
            })
            .collect();

        let queues = futures::future::try_join_all(handles).await.unwrap();
        assert!(queues.iter().all(|q| q.same_queue(&queues[0])));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_do_not_share_quota() {
        let clock = Arc::new(MockClock::from_unix_secs(1_700_000_000));
        let registry = QueueRegistry::new(clock.clone());
        let strategy = Strategy::new(1, Duration::from_secs(1));

        let a = registry.get_or_create(AdmissionKey::new("a", strategy));
        let b = registry.get_or_create(AdmissionKey::new("b", strategy));

        assert!(a.enqueue(Request::new("a-1", 0, clock.as_ref()), Duration::ZERO).await);
        assert!(b.enqueue(Request::new("b-1", 0, clock.as_ref()), Duration::ZERO).await);
        assert!(!a.enqueue(Request::new("a-2", 0, clock.as_ref()), Duration::ZERO).await);
    }

    #[test]
    fn test_snapshot_and_for_each() {
        let registry = registry();
        registry.get_or_create(key("zeta", 1));
        registry.get_or_create(key("alpha", 2));
        registry.get_or_create(key("alpha", 1));

        let mut visited = 0;
        registry.for_each(|_, _| visited += 1);
        assert_eq!(visited, 3);

        let names: Vec<_> = registry
            .snapshot()
            .into_iter()
            .map(|s| (s.remedy_name, s.queue.strategy.window_quota))
            .collect();
        assert_eq!(
            names,
            vec![
                ("alpha".to_string(), 1),
                ("alpha".to_string(), 2),
                ("zeta".to_string(), 1)
            ]
        );
    }

    #[test]
    fn test_close_all() {
        let registry = registry();
        registry.get_or_create(key("a", 1));
        registry.get_or_create(key("b", 1));

        registry.close_all();
        assert!(registry.snapshot().iter().all(|s| s.queue.closed));
    }
}
