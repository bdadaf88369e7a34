use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::domain::{EvaluationId, EvaluationStage, Money};
use super::notify::{Notification, Notifier};
use super::store::{ChangeRecord, EvaluationStore, StageTransition, StoreError};

/// Price headroom allowed above the trade value when matching candidates.
pub const UPGRADE_BUDGET: Money = Money::from_cents(150_000);

/// One replacement device the engine may propose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateDevice {
    pub model: String,
    pub market_value: Money,
    pub highlights: Vec<String>,
}

/// Read-only stock of replacement devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateInventory {
    devices: Vec<CandidateDevice>,
}

impl CandidateInventory {
    pub fn new(devices: Vec<CandidateDevice>) -> Self {
        Self { devices }
    }

    /// Reference stock of slightly better models.
    pub fn standard() -> Self {
        let device = |model: &str, value: i64, highlights: &[&str]| CandidateDevice {
            model: model.to_string(),
            market_value: Money::from_major(value),
            highlights: highlights.iter().map(|s| s.to_string()).collect(),
        };
        Self::new(vec![
            device(
                "iPhone 13 Pro",
                5500,
                &["Pro camera system", "A15 Bionic chip"],
            ),
            device(
                "Samsung Galaxy S22",
                4800,
                &["Dynamic AMOLED display", "Long-lasting battery"],
            ),
            device(
                "Xiaomi 12",
                3500,
                &["Ultra-fast charging", "Gaming performance"],
            ),
        ])
    }

    /// Candidates affordable within the budget ceiling.
    pub fn qualifying(&self, ceiling: Money) -> Vec<&CandidateDevice> {
        self.devices
            .iter()
            .filter(|device| device.market_value <= ceiling)
            .collect()
    }
}

/// Picks one candidate from a non-empty qualifying set.
pub trait SelectionPolicy: Send + Sync {
    fn pick<'a>(
        &self,
        candidates: &[&'a CandidateDevice],
        trade_value: Money,
    ) -> Option<&'a CandidateDevice>;
}

/// Deterministic policy: smallest price distance to the trade value, ties
/// going to the cheaper model.
pub struct ClosestPrice;

impl SelectionPolicy for ClosestPrice {
    fn pick<'a>(
        &self,
        candidates: &[&'a CandidateDevice],
        trade_value: Money,
    ) -> Option<&'a CandidateDevice> {
        candidates
            .iter()
            .min_by_key(|device| (device.market_value.distance(trade_value), device.market_value))
            .copied()
    }
}

/// Seedable uniform-random policy matching the reference behavior.
pub struct UniformRandom {
    rng: Mutex<StdRng>,
}

impl UniformRandom {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl SelectionPolicy for UniformRandom {
    fn pick<'a>(
        &self,
        candidates: &[&'a CandidateDevice],
        _trade_value: Money,
    ) -> Option<&'a CandidateDevice> {
        if candidates.is_empty() {
            return None;
        }
        let mut rng = self.rng.lock().expect("selection rng poisoned");
        let index = rng.gen_range(0..candidates.len());
        candidates.get(index).copied()
    }
}

/// Trade-up proposal derived from exactly one concluded report. Transient:
/// rendered into a notification and not persisted past delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub evaluation_id: EvaluationId,
    pub trade_value: Money,
    pub outcome: RecommendationOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RecommendationOutcome {
    Upgrade {
        candidate_model: String,
        market_value: Money,
        price_delta: Money,
        highlights: Vec<String>,
    },
    NoneAvailable,
}

impl Recommendation {
    pub fn notification(&self) -> Notification {
        let subject = format!(
            "Evaluation {} result and trade-up suggestion",
            self.evaluation_id
        );
        let message = match &self.outcome {
            RecommendationOutcome::Upgrade {
                candidate_model,
                price_delta,
                highlights,
                ..
            } => format!(
                "Your report is ready! Trade-in value: {}. Suggested upgrade: {} for {} more. Highlights: {}.",
                self.trade_value,
                candidate_model,
                price_delta,
                highlights.join(", ")
            ),
            RecommendationOutcome::NoneAvailable => format!(
                "Your report is ready! Trade-in value: {}. No trade-up suggestion available within your price range.",
                self.trade_value
            ),
        };
        Notification { subject, message }
    }
}

/// Typed projection of a change-feed image. Anything that fails to decode
/// into this shape is malformed upstream data, not a transient failure.
#[derive(Debug, Deserialize)]
struct ReportImage {
    evaluation_id: EvaluationId,
    user_id: String,
    #[serde(rename = "status")]
    stage: EvaluationStage,
    #[serde(default)]
    trade_value: Option<Money>,
}

/// Sole subscriber of the change feed: matches concluded reports against
/// the candidate inventory and notifies the user.
pub struct SuggestionEngine<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    inventory: CandidateInventory,
    budget: Money,
    policy: Arc<dyn SelectionPolicy>,
}

/// What one change event accomplished.
#[derive(Debug, Clone, PartialEq)]
pub enum SuggestionOutcome {
    Suggested(Recommendation),
    Skipped(SkipReason),
}

/// Events the engine drops on purpose. None of these are retried.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Image not at `REPORT_CONCLUDED`; not this engine's trigger.
    NotConcluded,
    /// The evaluation already advanced to `SUGGESTED`; duplicate event.
    AlreadySuggested,
    /// Image failed the typed decode.
    MalformedImage,
    /// Concluded report carries no usable trade value.
    MissingTradeValue,
}

impl<S, N> SuggestionEngine<S, N>
where
    S: EvaluationStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        store: Arc<S>,
        notifier: Arc<N>,
        inventory: CandidateInventory,
        policy: Arc<dyn SelectionPolicy>,
    ) -> Self {
        Self {
            store,
            notifier,
            inventory,
            budget: UPGRADE_BUDGET,
            policy,
        }
    }

    pub fn with_budget(mut self, budget: Money) -> Self {
        self.budget = budget;
        self
    }

    /// Handle one change-feed record.
    ///
    /// Malformed or valueless images are logged and discarded. The stage
    /// transition to `SUGGESTED` happens before the notification and is
    /// conditional on the record still being at `REPORT_CONCLUDED`, so a
    /// duplicate event can never notify twice. Only a store outage returns
    /// an error, leaving the event eligible for redelivery.
    pub fn handle(&self, record: &ChangeRecord) -> Result<SuggestionOutcome, SuggestionError> {
        let image: ReportImage = match serde_json::from_value(record.new_image.clone()) {
            Ok(image) => image,
            Err(error) => {
                tracing::warn!(%error, "discarding undecodable change image");
                return Ok(SuggestionOutcome::Skipped(SkipReason::MalformedImage));
            }
        };

        if image.stage != EvaluationStage::ReportConcluded {
            return Ok(SuggestionOutcome::Skipped(SkipReason::NotConcluded));
        }

        let trade_value = match image.trade_value {
            Some(value) if !value.is_negative() => value,
            _ => {
                tracing::warn!(
                    evaluation_id = %image.evaluation_id,
                    "concluded report has no usable trade value, discarding"
                );
                return Ok(SuggestionOutcome::Skipped(SkipReason::MissingTradeValue));
            }
        };

        let recommendation = self.recommend(&image.evaluation_id, trade_value);

        match self.store.advance_stage(
            &image.evaluation_id,
            EvaluationStage::ReportConcluded,
            EvaluationStage::Suggested,
        )? {
            StageTransition::Advanced(_) => {}
            StageTransition::Superseded => {
                return Ok(SuggestionOutcome::Skipped(SkipReason::AlreadySuggested));
            }
        }

        // Best-effort delivery: the stage transition stands either way.
        if let Err(error) = self.notifier.publish(recommendation.notification()) {
            tracing::warn!(
                evaluation_id = %image.evaluation_id,
                user_id = %image.user_id,
                %error,
                "suggestion notification failed"
            );
        } else {
            tracing::info!(
                evaluation_id = %image.evaluation_id,
                user_id = %image.user_id,
                "suggestion delivered"
            );
        }

        Ok(SuggestionOutcome::Suggested(recommendation))
    }

    fn recommend(&self, evaluation_id: &EvaluationId, trade_value: Money) -> Recommendation {
        let ceiling = trade_value + self.budget;
        let qualifying = self.inventory.qualifying(ceiling);

        let outcome = match self.policy.pick(&qualifying, trade_value) {
            Some(candidate) => RecommendationOutcome::Upgrade {
                candidate_model: candidate.model.clone(),
                market_value: candidate.market_value,
                price_delta: candidate.market_value - trade_value,
                highlights: candidate.highlights.clone(),
            },
            None => RecommendationOutcome::NoneAvailable,
        };

        Recommendation {
            evaluation_id: evaluation_id.clone(),
            trade_value,
            outcome,
        }
    }
}

/// Only store outages surface as errors; everything else is handled.
#[derive(Debug, thiserror::Error)]
pub enum SuggestionError {
    #[error(transparent)]
    Store(#[from] StoreError),
}
