//! Strategy-based queue remedy
//!
//! Resolves the remedy's strategy, finds (or creates) the queue for the
//! (remedy, strategy) pair, and holds the request until the queue decides.

use axum::http::HeaderMap;
use std::sync::Arc;
use tracing::{debug, error, trace};

use super::action::RemedyAction;
use super::error::RemedyError;
use crate::clock::Clock;
use crate::config::{RemedyConfig, StrategyBasedQueueConfig};
use crate::metrics;
use crate::queue::{AdmissionKey, Priority, QueueRegistry, Request, DEFAULT_PRIORITY};

/// Inbound request as seen by a remedy
#[derive(Debug, Clone)]
pub struct OnRequest {
    pub id: String,
    pub headers: HeaderMap,
}

impl OnRequest {
    pub fn new(id: impl Into<String>, headers: HeaderMap) -> Self {
        Self {
            id: id.into(),
            headers,
        }
    }
}

/// Queues requests per (remedy, strategy) and rejects those whose TTL passes
#[derive(Debug, Clone)]
pub struct StrategyBasedQueuePlugin {
    clock: Arc<dyn Clock>,
    queues: QueueRegistry,
}

impl StrategyBasedQueuePlugin {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            queues: QueueRegistry::new(clock.clone()),
            clock,
        }
    }

    /// Registry holding every queue this plugin has created
    pub fn queues(&self) -> &QueueRegistry {
        &self.queues
    }

    /// Decide whether `request` may proceed under `remedy`.
    ///
    /// Waits until the request is admitted or its TTL passes. Exactly one
    /// outcome is recorded in the request counter per decision.
    ///
    /// # Errors
    ///
    /// Returns [`RemedyError::MissingConfig`] if the remedy has no
    /// strategy-based queue block.
    pub async fn on_request(
        &self,
        request: &OnRequest,
        remedy: &RemedyConfig,
    ) -> Result<RemedyAction, RemedyError> {
        let Some(config) = remedy.strategy_based_queue.as_ref() else {
            error!(remedy = %remedy.name, "Remedy config missing");
            return Err(RemedyError::MissingConfig(remedy.name.clone()));
        };

        let queue = self
            .queues
            .get_or_create(AdmissionKey::new(remedy.name.as_str(), config.strategy()));

        let priority = extract_priority(&request.headers, config);
        trace!(request_id = %request.id, priority, "extracted priority");

        let admitted = queue
            .enqueue(
                Request::new(request.id.as_str(), priority, self.clock.as_ref()),
                config.ttl(),
            )
            .await;
        metrics::record_outcome(&remedy.name, priority, admitted);

        if admitted {
            trace!(request_id = %request.id, remedy = %remedy.name, "request admitted");
            return Ok(RemedyAction::NoOp);
        }

        debug!(
            request_id = %request.id,
            remedy = %remedy.name,
            priority,
            "request rejected, returning early response"
        );
        Ok(RemedyAction::too_many_requests(config.response_status_code))
    }
}

/// Priority of a request under `config`.
///
/// Without prioritization, or when the header is absent or its value names
/// no group, the request gets [`DEFAULT_PRIORITY`], the highest priority.
pub fn extract_priority(headers: &HeaderMap, config: &StrategyBasedQueueConfig) -> Priority {
    let Some(prioritization) = config.prioritization.as_ref() else {
        return DEFAULT_PRIORITY;
    };

    headers
        .get(prioritization.group_by.header_name.as_str())
        .and_then(|value| value.to_str().ok())
        .and_then(|value| prioritization.groups.get(value))
        .map(|group| group.priority)
        .unwrap_or(DEFAULT_PRIORITY)
}
