use serde::{Deserialize, Serialize};

use super::domain::{EvaluationId, EvaluationStage};

/// Work item handed from intake to the evaluation worker.
///
/// Field names follow the queue wire schema, so the message can be swapped
/// onto a managed queue without translation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub evaluation_id: EvaluationId,
    pub user_id: String,
    pub device_model: String,
    #[serde(rename = "s3_key_prefix")]
    pub upload_prefix: String,
    #[serde(rename = "status")]
    pub stage: EvaluationStage,
}

/// Producer side of the work queue. Consumption mechanics (polling, ack)
/// belong to the queue adapter, not the pipeline.
pub trait WorkQueue: Send + Sync {
    fn enqueue(&self, item: WorkItem) -> Result<(), QueueError>;
}

/// Queue failures are transient by definition; intake surfaces them to the
/// caller, consumers let the delivery lapse back onto the queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue unavailable: {0}")]
    Unavailable(String),
}

/// One at-least-once delivery attempt of a queued item.
///
/// Serializes flat so a dead-lettered delivery reads as the queue message
/// plus its attempt counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    #[serde(flatten)]
    pub item: WorkItem,
    pub attempt: u32,
}

impl Delivery {
    pub fn first(item: WorkItem) -> Self {
        Self { item, attempt: 1 }
    }
}

/// Redelivery budget applied by queue consumers before dead-lettering.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub const fn max_attempts(self) -> u32 {
        self.max_attempts
    }

    /// Decide what happens to a failed delivery: back onto the queue with
    /// the attempt counter bumped, or over to the dead-letter path once the
    /// budget is spent.
    pub fn after_failure(self, delivery: Delivery) -> RetryDecision {
        if delivery.attempt >= self.max_attempts {
            RetryDecision::DeadLetter(delivery)
        } else {
            RetryDecision::Redeliver(Delivery {
                attempt: delivery.attempt + 1,
                item: delivery.item,
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    Redeliver(Delivery),
    DeadLetter(Delivery),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> WorkItem {
        WorkItem {
            evaluation_id: EvaluationId("eval-9".to_string()),
            user_id: "u9".to_string(),
            device_model: "Galaxy S21".to_string(),
            upload_prefix: "uploads/u9/eval-9/".to_string(),
            stage: EvaluationStage::PendingUpload,
        }
    }

    #[test]
    fn work_item_uses_wire_field_names() {
        let json = serde_json::to_value(item()).expect("serializes");
        assert_eq!(json["s3_key_prefix"], "uploads/u9/eval-9/");
        assert_eq!(json["status"], "PENDING_UPLOAD");
    }

    #[test]
    fn delivery_serializes_as_the_message_plus_attempt() {
        let json = serde_json::to_value(Delivery::first(item())).expect("serializes");
        assert_eq!(json["evaluation_id"], "eval-9");
        assert_eq!(json["attempt"], 1);
    }

    #[test]
    fn retry_policy_redelivers_until_budget_spent() {
        let policy = RetryPolicy::new(3);
        let mut delivery = Delivery::first(item());

        for expected_attempt in [2, 3] {
            delivery = match policy.after_failure(delivery) {
                RetryDecision::Redeliver(next) => {
                    assert_eq!(next.attempt, expected_attempt);
                    next
                }
                RetryDecision::DeadLetter(_) => panic!("budget not yet spent"),
            };
        }

        assert!(matches!(
            policy.after_failure(delivery),
            RetryDecision::DeadLetter(dead) if dead.attempt == 3
        ));
    }

    #[test]
    fn retry_policy_never_loops_forever_on_zero_budget() {
        let policy = RetryPolicy::new(0);
        assert!(matches!(
            policy.after_failure(Delivery::first(item())),
            RetryDecision::DeadLetter(_)
        ));
    }
}
