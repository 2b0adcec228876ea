//! End-to-end admission scenarios on a paused clock

use remedy_queue::clock::{Clock, MockClock, SystemClock};
use remedy_queue::queue::{AdmissionKey, AdmissionQueue, QueueRegistry, Request, Strategy};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

// Aligned to a whole second so window boundaries fall on whole seconds of elapsed time
const ORIGIN: i64 = 1_700_000_000;

fn spawn_enqueue(
    queue: &AdmissionQueue,
    clock: &Arc<MockClock>,
    id: &str,
    priority: i32,
    ttl: Duration,
) -> JoinHandle<(bool, Duration)> {
    let queue = queue.clone();
    let clock = clock.clone();
    let request = Request::new(id, priority, clock.as_ref());
    tokio::spawn(async move {
        let admitted = queue.enqueue(request, ttl).await;
        (admitted, clock.elapsed())
    })
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_quota_wait_and_ttl_walkthrough() {
    let clock = Arc::new(MockClock::from_unix_secs(ORIGIN));
    let registry = QueueRegistry::new(clock.clone());
    let queue = registry.get_or_create(AdmissionKey::new(
        "walkthrough",
        Strategy::new(2, Duration::from_secs(1)),
    ));
    let ttl = Duration::from_secs(2);

    // t=0.0
    let r1 = spawn_enqueue(&queue, &clock, "R1", 0, ttl);
    settle().await;
    tokio::time::advance(Duration::from_millis(100)).await;

    // t=0.1
    let r2 = spawn_enqueue(&queue, &clock, "R2", 0, ttl);
    settle().await;
    tokio::time::advance(Duration::from_millis(100)).await;

    // t=0.2
    let r3 = spawn_enqueue(&queue, &clock, "R3", 0, ttl);
    settle().await;
    tokio::time::advance(Duration::from_millis(100)).await;

    // t=0.3
    let r4 = spawn_enqueue(&queue, &clock, "R4", 5, Duration::from_millis(100));

    assert_eq!(r1.await.unwrap(), (true, Duration::ZERO));
    assert_eq!(r2.await.unwrap(), (true, Duration::from_millis(100)));
    assert_eq!(r4.await.unwrap(), (false, Duration::from_millis(400)));
    assert_eq!(r3.await.unwrap(), (true, Duration::from_secs(1)));

    let snapshot = queue.snapshot();
    assert_eq!(snapshot.admitted, 1);
    assert!(snapshot.waiting.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_keys_are_isolated() {
    let clock = Arc::new(MockClock::from_unix_secs(ORIGIN));
    let registry = QueueRegistry::new(clock.clone());
    let strategy = Strategy::new(1, Duration::from_secs(1));

    let a = registry.get_or_create(AdmissionKey::new("alpha", strategy));
    let b = registry.get_or_create(AdmissionKey::new("beta", strategy));
    let a_wider = registry.get_or_create(AdmissionKey::new(
        "alpha",
        Strategy::new(1, Duration::from_secs(2)),
    ));

    for queue in [&a, &b, &a_wider] {
        let (admitted, _) = spawn_enqueue(queue, &clock, "first", 0, Duration::ZERO)
            .await
            .unwrap();
        assert!(admitted);
    }

    let (admitted, _) = spawn_enqueue(&a, &clock, "second", 0, Duration::ZERO)
        .await
        .unwrap();
    assert!(!admitted);
    assert_eq!(registry.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_quota_never_exceeded_under_contention() {
    let clock = Arc::new(MockClock::from_unix_secs(ORIGIN));
    let queue = AdmissionQueue::new(Strategy::new(3, Duration::from_secs(1)), clock.clone());

    let handles: Vec<_> = (0..12)
        .map(|i| spawn_enqueue(&queue, &clock, &format!("r-{i}"), i % 3, Duration::from_secs(10)))
        .collect();

    let mut per_window = std::collections::BTreeMap::new();
    for handle in handles {
        let (admitted, at) = handle.await.unwrap();
        assert!(admitted);
        *per_window.entry(at.as_secs()).or_insert(0) += 1;
    }

    assert_eq!(per_window, std::collections::BTreeMap::from([(0, 3), (1, 3), (2, 3), (3, 3)]));
}

#[tokio::test(start_paused = true)]
async fn test_idle_gap_grants_one_window_of_quota() {
    let clock = Arc::new(MockClock::from_unix_secs(ORIGIN));
    let queue = AdmissionQueue::new(Strategy::new(2, Duration::from_secs(1)), clock.clone());

    tokio::time::advance(Duration::from_secs(10)).await;

    let results: Vec<bool> = futures::future::join_all(
        (0..4).map(|i| queue.enqueue(Request::new(format!("r-{i}"), 0, clock.as_ref()), Duration::ZERO)),
    )
    .await;

    assert_eq!(results, vec![true, true, false, false]);
    assert_eq!(clock.now().timestamp(), ORIGIN + 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_quota_bound_on_multi_thread_runtime() {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let strategy = Strategy::new(5, Duration::from_millis(200));
    let queue = AdmissionQueue::new(strategy, clock.clone());

    let handles: Vec<_> = (0..60)
        .map(|i| {
            let queue = queue.clone();
            let clock = clock.clone();
            let request = Request::new(format!("r-{i}"), i % 4, clock.as_ref());
            tokio::spawn(async move {
                let admitted = queue.enqueue(request, Duration::from_secs(30)).await;
                (admitted, strategy.window_index(clock.now()))
            })
        })
        .collect();

    let mut per_window = std::collections::BTreeMap::new();
    for (admitted, window) in futures::future::try_join_all(handles).await.unwrap() {
        assert!(admitted);
        *per_window.entry(window).or_insert(0u32) += 1;
    }

    assert_eq!(per_window.values().sum::<u32>(), 60);
    assert!(
        per_window.values().all(|&count| count <= strategy.window_quota),
        "per_window={per_window:?}"
    );
    assert!(queue.counts().is_empty());
}
