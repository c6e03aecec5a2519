use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;

use crate::bulk::BulkReconciler;
use crate::sync::SyncOrchestrator;
use crate::{api, telemetry};

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    orchestrator: SyncOrchestrator,
    reconciler: BulkReconciler,
}

impl AppState {
    pub fn new(
        metrics: PrometheusHandle,
        orchestrator: SyncOrchestrator,
        bulk_concurrency: usize,
    ) -> Self {
        let reconciler = BulkReconciler::new(orchestrator.clone(), bulk_concurrency);
        Self {
            metrics,
            orchestrator,
            reconciler,
        }
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn orchestrator(&self) -> &SyncOrchestrator {
        &self.orchestrator
    }

    pub fn reconciler(&self) -> &BulkReconciler {
        &self.reconciler
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/api/goals", get(api::list_goals).post(api::create_goal))
        .route("/api/goals/bulk", post(api::bulk_save))
        .route(
            "/api/goals/:goal_id",
            put(api::update_goal).delete(api::delete_goal),
        )
        .route("/api/cart/progress", get(api::cart_progress))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> Response {
    let body = telemetry::render_metrics(state.metrics());
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        Body::from(body),
    )
        .into_response()
}
