use serde::{Deserialize, Serialize};

use super::domain::{EvaluationId, EvaluationRecord, EvaluationStage};

/// Durable record store for evaluations.
///
/// Implementations must emit a [`ChangeRecord`] for every committed write,
/// ordered per evaluation id and delivered at least once to the change-feed
/// subscriber. No-op outcomes (`AlreadyConcluded`, `Superseded`) commit
/// nothing and emit nothing, which is what makes the stage handlers
/// idempotent under redelivery.
pub trait EvaluationStore: Send + Sync {
    /// Conditional report write keyed on the evaluation id.
    ///
    /// Inserts (or completes) the record at `REPORT_CONCLUDED`; no-ops when
    /// a report has already been concluded for the id so a redelivered work
    /// item cannot overwrite a finalized report.
    fn conclude_report(&self, record: EvaluationRecord) -> Result<ReportCommit, StoreError>;

    /// Stage transition guarded by the expected current stage.
    ///
    /// Succeeds exactly once per transition; a record already at or past
    /// `next` reports `Superseded` instead of writing.
    fn advance_stage(
        &self,
        id: &EvaluationId,
        expected: EvaluationStage,
        next: EvaluationStage,
    ) -> Result<StageTransition, StoreError>;

    fn fetch(&self, id: &EvaluationId) -> Result<Option<EvaluationRecord>, StoreError>;
}

/// Outcome of a conditional report write.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportCommit {
    Concluded(EvaluationRecord),
    AlreadyConcluded,
}

/// Outcome of a guarded stage transition.
#[derive(Debug, Clone, PartialEq)]
pub enum StageTransition {
    Advanced(EvaluationRecord),
    Superseded,
}

/// Store failures; `Unavailable` is transient and drives redelivery.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("evaluation {0} not found")]
    NotFound(EvaluationId),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Change-feed entry emitted for every committed store write.
///
/// `newImage` stays untyped on the wire; consumers run it through a typed
/// decode and discard images that do not validate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    #[serde(rename = "eventName")]
    pub event: ChangeEventKind,
    #[serde(rename = "newImage")]
    pub new_image: serde_json::Value,
}

impl ChangeRecord {
    pub fn insert(record: &EvaluationRecord) -> Self {
        Self::build(ChangeEventKind::Insert, record)
    }

    pub fn modify(record: &EvaluationRecord) -> Self {
        Self::build(ChangeEventKind::Modify, record)
    }

    fn build(event: ChangeEventKind, record: &EvaluationRecord) -> Self {
        let new_image = serde_json::to_value(record)
            .unwrap_or_else(|_| serde_json::Value::Object(Default::default()));
        Self { event, new_image }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeEventKind {
    Insert,
    Modify,
}
