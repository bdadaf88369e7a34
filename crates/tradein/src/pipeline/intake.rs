use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{EvaluationId, EvaluationStage};
use super::queue::{QueueError, WorkItem, WorkQueue};

/// Incoming trade-in request body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IntakeRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub device_model: String,
}

/// Time-bounded credential allowing the client to write one photo straight
/// to blob storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadGrant {
    pub target_key: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues upload grants scoped to a single object key.
pub trait UploadGrantIssuer: Send + Sync {
    fn issue(&self, key: &str, valid_for: Duration) -> Result<UploadGrant, GrantError>;
}

#[derive(Debug, thiserror::Error)]
pub enum GrantError {
    #[error("blob storage unavailable: {0}")]
    Unavailable(String),
}

/// Result returned to the caller: the allocated id plus one grant per
/// expected photo, keyed `photo_1..photo_N`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntakeReceipt {
    pub evaluation_id: EvaluationId,
    pub upload_grants: BTreeMap<String, UploadGrant>,
}

/// Knobs for the intake stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntakeConfig {
    pub photos_per_evaluation: u8,
    pub grant_ttl_secs: i64,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            photos_per_evaluation: 3,
            grant_ttl_secs: 3600,
        }
    }
}

/// Front door of the pipeline: validate, allocate an id, issue upload
/// grants, then enqueue exactly one work item.
///
/// Intake never writes the state store; the worker creates the record, so
/// an upload that never completes costs nothing beyond the queue message.
/// Records abandoned at `PENDING_UPLOAD` are left in place (an expiry sweep
/// is a separate operational concern).
pub struct IntakeService<Q, G> {
    queue: Arc<Q>,
    grants: Arc<G>,
    config: IntakeConfig,
}

impl<Q, G> IntakeService<Q, G>
where
    Q: WorkQueue + 'static,
    G: UploadGrantIssuer + 'static,
{
    pub fn new(queue: Arc<Q>, grants: Arc<G>, config: IntakeConfig) -> Self {
        Self {
            queue,
            grants,
            config,
        }
    }

    /// Accept a trade-in request.
    ///
    /// Enqueue is deliberately the last side effect: a validation or grant
    /// failure must not leave a work item behind for a request the caller
    /// never saw succeed.
    pub fn submit(&self, request: IntakeRequest) -> Result<IntakeReceipt, IntakeError> {
        let user_id = request.user_id.trim();
        let device_model = request.device_model.trim();
        if user_id.is_empty() {
            return Err(ValidationError::MissingUserId.into());
        }
        if device_model.is_empty() {
            return Err(ValidationError::MissingDeviceModel.into());
        }

        let evaluation_id = EvaluationId::generate();
        let upload_prefix = format!("uploads/{user_id}/{evaluation_id}/");
        let valid_for = Duration::seconds(self.config.grant_ttl_secs);

        let mut upload_grants = BTreeMap::new();
        for photo in 1..=self.config.photos_per_evaluation {
            let key = format!("{upload_prefix}photo_{photo}.jpg");
            let grant = self.grants.issue(&key, valid_for)?;
            upload_grants.insert(format!("photo_{photo}"), grant);
        }

        self.queue.enqueue(WorkItem {
            evaluation_id: evaluation_id.clone(),
            user_id: user_id.to_string(),
            device_model: device_model.to_string(),
            upload_prefix,
            stage: EvaluationStage::PendingUpload,
        })?;

        tracing::info!(%evaluation_id, user_id, device_model, "evaluation accepted");

        Ok(IntakeReceipt {
            evaluation_id,
            upload_grants,
        })
    }
}

/// Client input that fails validation; surfaced directly, nothing enqueued.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("user_id is required")]
    MissingUserId,
    #[error("device_model is required")]
    MissingDeviceModel,
}

/// Error raised by the intake service.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Grant(#[from] GrantError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}
