// HTTP surface
//
// Two listeners:
// - Gateway (default 0.0.0.0:8040): ANY /admit/{remedy} runs the remedy for the
//   request, GET /queues reports queue state as JSON
// - Metrics (default 0.0.0.0:9090): GET /metrics for Prometheus, GET /health
//
// Ctrl-C closes every queue so waiting callers get their rejection before the
// gateway drains its connections.

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::config::Config;
use crate::metrics;
use crate::queue::QueueRegistry;
use crate::remedy::{OnRequest, RemedyAction, RemedyError, StrategyBasedQueuePlugin};

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const ADMITTED_BODY: &str = "admitted";

/// Shared state of the gateway listener
#[derive(Debug, Clone)]
pub struct AppState {
    config: Arc<Config>,
    plugin: StrategyBasedQueuePlugin,
}

impl AppState {
    pub fn new(config: Config, clock: Arc<dyn Clock>) -> Self {
        Self {
            config: Arc::new(config),
            plugin: StrategyBasedQueuePlugin::new(clock),
        }
    }

    pub fn queues(&self) -> &QueueRegistry {
        self.plugin.queues()
    }
}

/// Router for the admission endpoints
pub fn gateway_router(state: AppState) -> Router {
    Router::new()
        .route("/admit/{remedy}", any(admit_handler))
        .route("/queues", get(queues_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Router for the Prometheus endpoints
pub fn metrics_router() -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
}

/// Run the gateway (and metrics listener, if enabled) until Ctrl-C.
///
/// Both listeners are bound before anything is served, so a port that is
/// already taken fails startup. A metrics listener that stops while the
/// gateway is running also ends `serve` with its error.
pub async fn serve(config: Config, clock: Arc<dyn Clock>) -> Result<()> {
    let server_port = config.server.port;
    let metrics_config = config.metrics.clone();
    let state = AppState::new(config, clock);
    let queues = state.queues().clone();

    let metrics_listener = if metrics_config.enabled {
        let listener = bind(metrics_config.port)
            .await
            .context("Failed to bind metrics server")?;
        metrics::init(&queues).context("Failed to initialize metrics")?;
        Some(listener)
    } else {
        None
    };
    let gateway_listener = bind(server_port)
        .await
        .context("Failed to bind gateway server")?;

    let shutdown_queues = queues.clone();
    let gateway = run_gateway_server(gateway_listener, state, async move {
        shutdown_signal().await;
        info!("Shutdown requested, releasing waiting requests");
        shutdown_queues.close_all();
    });

    let Some(metrics_listener) = metrics_listener else {
        return gateway.await;
    };

    tokio::select! {
        result = gateway => result,
        result = run_metrics_server(metrics_listener) => {
            let err = match result {
                Ok(()) => anyhow::anyhow!("Metrics server stopped unexpectedly"),
                Err(e) => e,
            };
            error!("Metrics server failed: {:#}", err);
            queues.close_all();
            Err(err)
        }
    }
}

async fn bind(port: u16) -> Result<tokio::net::TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Address {} unavailable", addr))
}

/// Serve the gateway on an already bound listener
pub async fn run_gateway_server<F>(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Starting gateway server on {}", listener.local_addr()?);

    axum::serve(listener, gateway_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Gateway server error")?;

    Ok(())
}

/// Serve the metrics endpoints on an already bound listener
pub async fn run_metrics_server(listener: tokio::net::TcpListener) -> Result<()> {
    info!("Starting metrics server on {}", listener.local_addr()?);

    axum::serve(listener, metrics_router())
        .await
        .context("Metrics server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Admission endpoint handler
async fn admit_handler(
    State(state): State<AppState>,
    Path(remedy_name): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some(remedy) = state.config.remedy(&remedy_name) else {
        return (StatusCode::NOT_FOUND, format!("Unknown remedy: {}", remedy_name)).into_response();
    };

    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let request = OnRequest::new(request_id, headers);

    match state.plugin.on_request(&request, remedy).await {
        Ok(RemedyAction::NoOp) => admitted(&request.id),
        Ok(RemedyAction::EarlyResponse(early)) => {
            let status = StatusCode::from_u16(early.status).unwrap_or(StatusCode::TOO_MANY_REQUESTS);
            (
                status,
                [
                    (header::CONTENT_TYPE, early.content_type),
                    (header::HeaderName::from_static(REQUEST_ID_HEADER), request.id),
                ],
                early.body,
            )
                .into_response()
        }
        Err(RemedyError::MissingConfig(name)) => {
            warn!(remedy = %name, request_id = %request.id, "Remedy has no queue config, passing request through");
            admitted(&request.id)
        }
    }
}

fn admitted(request_id: &str) -> Response {
    (
        StatusCode::OK,
        [(header::HeaderName::from_static(REQUEST_ID_HEADER), request_id.to_string())],
        ADMITTED_BODY,
    )
        .into_response()
}

/// Queue state endpoint
async fn queues_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.queues().snapshot())
}

/// Metrics endpoint handler
async fn metrics_handler() -> Response {
    match metrics::gather_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error gathering metrics: {}", e),
            )
                .into_response()
        }
    }
}

/// Health check endpoint
async fn health_handler() -> impl IntoResponse {
    StatusCode::OK
}
