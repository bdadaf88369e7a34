use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use serde::Serialize;
use serde_json::json;
use tradein::pipeline::Delivery;

/// Operational endpoints layered on top of the pipeline router.
pub(crate) fn with_ops_routes(router: axum::Router) -> axum::Router {
    router
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/dead-letters",
            axum::routing::get(dead_letters_endpoint),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Deliveries that exhausted the retry budget, held for manual handling.
#[derive(Debug, Serialize)]
pub(crate) struct DeadLetterReport {
    count: usize,
    deliveries: Vec<Delivery>,
}

pub(crate) async fn dead_letters_endpoint(
    Extension(state): Extension<AppState>,
) -> Json<DeadLetterReport> {
    let deliveries = state.queue.dead_letters();
    Json(DeadLetterReport {
        count: deliveries.len(),
        deliveries,
    })
}
