//! Device trade-in evaluation pipeline.
//!
//! Stages communicate only through durable, at-least-once collaborators
//! (work queue, state store change feed, notification topic), all expressed
//! as traits so the orchestration logic can be exercised in isolation.
//! Every per-evaluation mutation is conditional, making redelivered or
//! out-of-order messages safe to replay.

pub mod domain;
pub mod intake;
pub mod notify;
pub mod queue;
pub mod router;
pub mod store;
pub mod suggest;
pub mod worker;

#[cfg(test)]
mod tests;

pub use domain::{
    DeviceCondition, EvaluationId, EvaluationRecord, EvaluationStage, Money, MoneyError, Report,
};
pub use intake::{
    GrantError, IntakeConfig, IntakeReceipt, IntakeRequest, IntakeService, UploadGrant,
    UploadGrantIssuer, ValidationError,
};
pub use notify::{Notification, Notifier, NotifyError};
pub use queue::{Delivery, QueueError, RetryDecision, RetryPolicy, WorkItem, WorkQueue};
pub use router::{evaluation_router, PipelineApi};
pub use store::{
    ChangeEventKind, ChangeRecord, EvaluationStore, ReportCommit, StageTransition, StoreError,
};
pub use suggest::{
    CandidateDevice, CandidateInventory, ClosestPrice, Recommendation, RecommendationOutcome,
    SelectionPolicy, SkipReason, SuggestionEngine, SuggestionError, SuggestionOutcome,
    UniformRandom, UPGRADE_BUDGET,
};
pub use worker::{
    Assessment, EvaluationWorker, RandomScoring, ScoringStrategy, WorkOutcome, WorkerError,
};
