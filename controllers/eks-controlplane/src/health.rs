//! Probe and metrics endpoints.
//!
//! - `/healthz`: liveness, 200 while the process serves requests
//! - `/readyz`: 200 once the controller is watching
//! - `/metrics`: Prometheus text format

use crate::error::ControllerError;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Reconciliation outcome label values.
pub const RESULT_SUCCESS: &str = "success";
pub const RESULT_ERROR: &str = "error";
pub const RESULT_FAILED: &str = "failed";

/// Operator metrics
#[derive(Debug, Clone)]
pub struct Metrics {
    /// Reconciliation passes by result
    pub reconciliations_total: IntCounterVec,
    /// Wall time of a reconciliation pass
    pub reconcile_duration_seconds: Histogram,
    /// External resources deleted by garbage collection
    pub gc_deleted_total: IntCounter,
}

impl Metrics {
    /// Create the metrics and register them with `registry`.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let reconciliations_total = IntCounterVec::new(
            Opts::new("eks_controlplane_reconciliations_total", "Reconciliation passes by result"),
            &["result"],
        )?;
        let reconcile_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "eks_controlplane_reconcile_duration_seconds",
                "Duration of a reconciliation pass in seconds",
            )
            .buckets(prometheus::exponential_buckets(0.01, 2.0, 14)?),
        )?;
        let gc_deleted_total = IntCounter::new(
            "eks_controlplane_gc_deleted_total",
            "External resources deleted during cluster teardown",
        )?;

        registry.register(Box::new(reconciliations_total.clone()))?;
        registry.register(Box::new(reconcile_duration_seconds.clone()))?;
        registry.register(Box::new(gc_deleted_total.clone()))?;

        Ok(Self {
            reconciliations_total,
            reconcile_duration_seconds,
            gc_deleted_total,
        })
    }

    /// Record one pass.
    pub fn record_reconcile(&self, result: &str, duration: Duration) {
        self.reconciliations_total.with_label_values(&[result]).inc();
        self.reconcile_duration_seconds.observe(duration.as_secs_f64());
    }

    /// Record deleted external resources.
    pub fn record_gc_deleted(&self, count: usize) {
        self.gc_deleted_total.inc_by(count as u64);
    }
}

/// Shared state for the health server
#[derive(Debug)]
pub struct HealthState {
    ready: AtomicBool,
    registry: Registry,
}

impl HealthState {
    /// State serving `registry`, not ready yet.
    pub fn new(registry: Registry) -> Self {
        Self {
            ready: AtomicBool::new(false),
            registry,
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    /// Gathered metrics in text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready() {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

async fn metrics_handler(State(state): State<Arc<HealthState>>) -> Response {
    match state.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response()
        }
    }
}

/// Create the health server router
pub fn create_health_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve probes and metrics on `port`.
pub async fn run_health_server(state: Arc<HealthState>, port: u16) -> Result<(), ControllerError> {
    let app = create_health_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Health server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ControllerError::InvalidConfig(format!("cannot bind health port {port}: {e}")))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| ControllerError::Watch(format!("health server failed: {e}")))
}
