// Prometheus metrics for the admission queues
//
// Exposes metrics on /metrics HTTP endpoint:
// - Admission outcomes per remedy and priority (counter)
// - Requests currently waiting per remedy and priority (gauge, sampled at scrape time)

use lazy_static::lazy_static;
use parking_lot::Mutex;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::queue::{Priority, QueueRegistry};

pub const REQUESTS_TOTAL_METRIC: &str = "remedy_queue_requests_total";
pub const REQUESTS_IN_QUEUE_METRIC: &str = "remedy_queue_requests_in_queue";

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    pub static ref QUEUE_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(REQUESTS_TOTAL_METRIC, "Admission decisions made by strategy-based queues"),
        &["remedy", "priority", "ttl_passed"]
    ).expect("Failed to create queue requests metric");
}

/// Record one admission decision.
///
/// `ttl_passed` is the inverse of `admitted`: a rejected request is one whose
/// TTL ran out before a slot opened.
pub fn record_outcome(remedy: &str, priority: Priority, admitted: bool) {
    let priority = priority.to_string();
    let ttl_passed = if admitted { "false" } else { "true" };
    QUEUE_REQUESTS_TOTAL
        .with_label_values(&[remedy, priority.as_str(), ttl_passed])
        .inc();
}

/// Samples waiting-request counts from every live queue on each scrape
pub struct QueueDepthCollector {
    queues: QueueRegistry,
    gauge: IntGaugeVec,
    // reset/fill/collect must not interleave between concurrent scrapes
    scrape: Mutex<()>,
}

impl QueueDepthCollector {
    pub fn new(queues: QueueRegistry) -> prometheus::Result<Self> {
        let gauge = IntGaugeVec::new(
            Opts::new(REQUESTS_IN_QUEUE_METRIC, "Current number of requests in queue"),
            &["remedy", "priority"],
        )?;
        Ok(Self {
            queues,
            gauge,
            scrape: Mutex::new(()),
        })
    }

    /// Waiting counts summed per (remedy, priority)
    fn sample(&self) -> BTreeMap<(String, Priority), usize> {
        let mut depths = BTreeMap::new();
        self.queues.for_each(|key, queue| {
            for (priority, count) in queue.counts() {
                *depths
                    .entry((key.remedy_name.clone(), priority))
                    .or_insert(0) += count;
            }
        });
        depths
    }
}

impl Collector for QueueDepthCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.gauge.desc()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let _scrape = self.scrape.lock();
        self.gauge.reset();
        for ((remedy, priority), count) in self.sample() {
            let priority = priority.to_string();
            self.gauge
                .with_label_values(&[remedy.as_str(), priority.as_str()])
                .set(i64::try_from(count).unwrap_or(i64::MAX));
        }
        self.gauge.collect()
    }
}

/// Register the queue metrics with `registry`
pub fn register(registry: &Registry, queues: &QueueRegistry) -> prometheus::Result<()> {
    registry.register(Box::new(QUEUE_REQUESTS_TOTAL.clone()))?;
    registry.register(Box::new(QueueDepthCollector::new(queues.clone())?))?;
    Ok(())
}

/// Initialize the process-wide registry - must be called once at startup
pub fn init(queues: &QueueRegistry) -> prometheus::Result<()> {
    register(&REGISTRY, queues)
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    encode(&REGISTRY)
}

/// Render `registry` in Prometheus text format
pub fn encode(registry: &Registry) -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
