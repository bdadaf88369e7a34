use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::json;

use super::domain::{EvaluationId, EvaluationRecord, Money};
use super::intake::{IntakeError, IntakeRequest, IntakeService, UploadGrantIssuer};
use super::queue::WorkQueue;
use super::store::{EvaluationStore, StoreError};

/// Shared state for the evaluation endpoints: the intake front door plus a
/// read path into the state store.
pub struct PipelineApi<Q, G, S> {
    pub intake: Arc<IntakeService<Q, G>>,
    pub store: Arc<S>,
}

impl<Q, G, S> Clone for PipelineApi<Q, G, S> {
    fn clone(&self) -> Self {
        Self {
            intake: Arc::clone(&self.intake),
            store: Arc::clone(&self.store),
        }
    }
}

/// Router builder exposing the HTTP boundary of the pipeline.
pub fn evaluation_router<Q, G, S>(api: PipelineApi<Q, G, S>) -> Router
where
    Q: WorkQueue + 'static,
    G: UploadGrantIssuer + 'static,
    S: EvaluationStore + 'static,
{
    Router::new()
        .route("/api/v1/evaluations", post(submit_handler::<Q, G, S>))
        .route(
            "/api/v1/evaluations/:evaluation_id",
            get(status_handler::<Q, G, S>),
        )
        .with_state(api)
}

pub(crate) async fn submit_handler<Q, G, S>(
    State(api): State<PipelineApi<Q, G, S>>,
    axum::Json(request): axum::Json<IntakeRequest>,
) -> Response
where
    Q: WorkQueue + 'static,
    G: UploadGrantIssuer + 'static,
    S: EvaluationStore + 'static,
{
    match api.intake.submit(request) {
        Ok(receipt) => {
            let payload = json!({
                "evaluation_id": receipt.evaluation_id,
                "message": "Evaluation started. Use the grants to upload the device photos.",
                "upload_grants": receipt.upload_grants,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(IntakeError::Validation(error)) => {
            let payload = json!({ "message": error.to_string() });
            (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response()
        }
        Err(error) => {
            tracing::error!(%error, "intake failed");
            let payload = json!({ "message": "internal error while starting the evaluation" });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

pub(crate) async fn status_handler<Q, G, S>(
    State(api): State<PipelineApi<Q, G, S>>,
    Path(evaluation_id): Path<String>,
) -> Response
where
    Q: WorkQueue + 'static,
    G: UploadGrantIssuer + 'static,
    S: EvaluationStore + 'static,
{
    let id = EvaluationId(evaluation_id);
    match api.store.fetch(&id) {
        Ok(Some(record)) => {
            (StatusCode::OK, axum::Json(EvaluationStatusView::from(&record))).into_response()
        }
        Ok(None) | Err(StoreError::NotFound(_)) => {
            let payload = json!({ "message": "evaluation not found" });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        Err(error) => {
            tracing::error!(%error, "status lookup failed");
            let payload = json!({ "message": "internal error while fetching the evaluation" });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

/// Sanitized status projection returned by the lookup endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationStatusView {
    pub evaluation_id: EvaluationId,
    pub device_model: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade_value: Option<Money>,
}

impl From<&EvaluationRecord> for EvaluationStatusView {
    fn from(record: &EvaluationRecord) -> Self {
        Self {
            evaluation_id: record.evaluation_id.clone(),
            device_model: record.device_model.clone(),
            status: record.stage.label(),
            score: record.report.as_ref().map(|report| report.score),
            condition: record.report.as_ref().map(|report| report.condition.label()),
            trade_value: record.report.as_ref().map(|report| report.trade_value),
        }
    }
}
