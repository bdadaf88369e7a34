use std::sync::{Arc, Mutex};

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::domain::{DeviceCondition, EvaluationRecord, EvaluationStage, Money, Report};
use super::queue::WorkItem;
use super::store::{EvaluationStore, ReportCommit, StoreError};

/// Derives the raw score and trade value for a work item.
///
/// The production path will analyze the uploaded photos; until then the
/// reference behavior is a bounded random draw, kept behind this seam so
/// the pipeline stays deterministic under test.
pub trait ScoringStrategy: Send + Sync {
    fn assess(&self, item: &WorkItem) -> Assessment;
}

/// Raw outputs of a scoring pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assessment {
    pub score: u8,
    pub trade_value: Money,
}

/// Seedable stub scoring: score 5..=10, value 500.00..=3000.00.
pub struct RandomScoring {
    rng: Mutex<StdRng>,
}

impl RandomScoring {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }
}

impl ScoringStrategy for RandomScoring {
    fn assess(&self, _item: &WorkItem) -> Assessment {
        let mut rng = self.rng.lock().expect("scoring rng poisoned");
        Assessment {
            score: rng.gen_range(5..=10),
            trade_value: Money::from_cents(rng.gen_range(50_000..=300_000)),
        }
    }
}

/// Consumes queued work items and concludes the evaluation report.
pub struct EvaluationWorker<S> {
    store: Arc<S>,
    scoring: Arc<dyn ScoringStrategy>,
}

/// What one delivery accomplished.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkOutcome {
    Concluded(EvaluationRecord),
    /// A report already exists for the id; the redelivered item is spent.
    AlreadyConcluded,
}

impl<S> EvaluationWorker<S>
where
    S: EvaluationStore + 'static,
{
    pub fn new(store: Arc<S>, scoring: Arc<dyn ScoringStrategy>) -> Self {
        Self { store, scoring }
    }

    /// Process one delivery of a work item.
    ///
    /// The whole result lands in a single conditional write keyed on the
    /// evaluation id, so redelivery cannot produce a second report or a
    /// second change event. Errors propagate unacked to the consumer loop,
    /// which redelivers and eventually dead-letters the item.
    pub fn process(&self, item: &WorkItem) -> Result<WorkOutcome, WorkerError> {
        let assessment = self.scoring.assess(item);
        let condition = DeviceCondition::from_score(assessment.score);

        let record = EvaluationRecord {
            evaluation_id: item.evaluation_id.clone(),
            user_id: item.user_id.clone(),
            device_model: item.device_model.clone(),
            upload_prefix: item.upload_prefix.clone(),
            stage: EvaluationStage::ReportConcluded,
            report: Some(Report {
                score: assessment.score,
                condition,
                trade_value: assessment.trade_value,
            }),
            created_at: Utc::now(),
        };

        match self.store.conclude_report(record)? {
            ReportCommit::Concluded(record) => {
                tracing::info!(
                    evaluation_id = %record.evaluation_id,
                    score = assessment.score,
                    condition = condition.label(),
                    trade_value = %assessment.trade_value,
                    "report concluded"
                );
                Ok(WorkOutcome::Concluded(record))
            }
            ReportCommit::AlreadyConcluded => {
                tracing::info!(
                    evaluation_id = %item.evaluation_id,
                    "report already concluded, dropping redelivery"
                );
                Ok(WorkOutcome::AlreadyConcluded)
            }
        }
    }
}

/// Worker failures are transient by construction; the delivery is not
/// acked and becomes eligible for redelivery.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Store(#[from] StoreError),
}
