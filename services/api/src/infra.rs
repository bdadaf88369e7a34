use std::collections::{HashMap, VecDeque};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;
use tradein::pipeline::{
    ChangeRecord, Delivery, EvaluationId, EvaluationRecord, EvaluationStage, EvaluationStore,
    GrantError, Notification, Notifier, NotifyError, QueueError, ReportCommit, RetryDecision,
    RetryPolicy, StageTransition, StoreError, UploadGrant, UploadGrantIssuer, WorkItem, WorkQueue,
};
use uuid::Uuid;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) queue: Arc<InMemoryWorkQueue>,
}

/// Local stand-in for the managed work queue: at-least-once deliveries with
/// a redelivery budget and a dead-letter list for manual inspection.
pub(crate) struct InMemoryWorkQueue {
    pending: Mutex<VecDeque<Delivery>>,
    dead_letters: Mutex<Vec<Delivery>>,
    policy: RetryPolicy,
    wakeup: Notify,
}

impl InMemoryWorkQueue {
    pub(crate) fn new(policy: RetryPolicy) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            dead_letters: Mutex::new(Vec::new()),
            policy,
            wakeup: Notify::new(),
        }
    }

    /// Await the next delivery. Popping is the implicit ack; a failed
    /// delivery must be handed back through [`Self::retry`].
    pub(crate) async fn next(&self) -> Delivery {
        loop {
            if let Some(delivery) = self.try_next() {
                return delivery;
            }
            self.wakeup.notified().await;
        }
    }

    pub(crate) fn try_next(&self) -> Option<Delivery> {
        self.pending
            .lock()
            .expect("queue mutex poisoned")
            .pop_front()
    }

    /// Apply the redelivery budget to a failed delivery.
    pub(crate) fn retry(&self, delivery: Delivery) {
        match self.policy.after_failure(delivery) {
            RetryDecision::Redeliver(next) => {
                tracing::warn!(
                    evaluation_id = %next.item.evaluation_id,
                    attempt = next.attempt,
                    "work item redelivered"
                );
                self.pending
                    .lock()
                    .expect("queue mutex poisoned")
                    .push_back(next);
                self.wakeup.notify_one();
            }
            RetryDecision::DeadLetter(dead) => {
                tracing::error!(
                    evaluation_id = %dead.item.evaluation_id,
                    attempts = dead.attempt,
                    "work item dead-lettered after exhausting the retry budget"
                );
                self.dead_letters
                    .lock()
                    .expect("dead-letter mutex poisoned")
                    .push(dead);
            }
        }
    }

    pub(crate) fn dead_letters(&self) -> Vec<Delivery> {
        self.dead_letters
            .lock()
            .expect("dead-letter mutex poisoned")
            .clone()
    }
}

impl WorkQueue for InMemoryWorkQueue {
    fn enqueue(&self, item: WorkItem) -> Result<(), QueueError> {
        self.pending
            .lock()
            .expect("queue mutex poisoned")
            .push_back(Delivery::first(item));
        self.wakeup.notify_one();
        Ok(())
    }
}

/// Local stand-in for the key-value table plus its change stream. Every
/// committed write is pushed onto the feed channel in commit order.
pub(crate) struct InMemoryEvaluationStore {
    records: Mutex<HashMap<EvaluationId, EvaluationRecord>>,
    feed: UnboundedSender<ChangeRecord>,
}

impl InMemoryEvaluationStore {
    pub(crate) fn with_feed() -> (Arc<Self>, UnboundedReceiver<ChangeRecord>) {
        let (feed, receiver) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                records: Mutex::new(HashMap::new()),
                feed,
            }),
            receiver,
        )
    }

    fn emit(&self, event: ChangeRecord) {
        // The subscriber hanging up only happens at shutdown.
        let _ = self.feed.send(event);
    }
}

impl EvaluationStore for InMemoryEvaluationStore {
    fn conclude_report(&self, record: EvaluationRecord) -> Result<ReportCommit, StoreError> {
        let mut records = self.records.lock().expect("store mutex poisoned");
        if let Some(existing) = records.get(&record.evaluation_id) {
            if existing.report.is_some() || existing.stage >= EvaluationStage::ReportConcluded {
                return Ok(ReportCommit::AlreadyConcluded);
            }
        }
        let event = if records.contains_key(&record.evaluation_id) {
            ChangeRecord::modify(&record)
        } else {
            ChangeRecord::insert(&record)
        };
        records.insert(record.evaluation_id.clone(), record.clone());
        self.emit(event);
        Ok(ReportCommit::Concluded(record))
    }

    fn advance_stage(
        &self,
        id: &EvaluationId,
        expected: EvaluationStage,
        next: EvaluationStage,
    ) -> Result<StageTransition, StoreError> {
        let mut records = self.records.lock().expect("store mutex poisoned");
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if record.stage != expected {
            return Ok(StageTransition::Superseded);
        }
        record.stage = next;
        let updated = record.clone();
        self.emit(ChangeRecord::modify(&updated));
        Ok(StageTransition::Advanced(updated))
    }

    fn fetch(&self, id: &EvaluationId) -> Result<Option<EvaluationRecord>, StoreError> {
        Ok(self
            .records
            .lock()
            .expect("store mutex poisoned")
            .get(id)
            .cloned())
    }
}

/// Stub pre-signed upload grants against the configured bucket.
pub(crate) struct StubGrantIssuer {
    bucket: String,
}

impl StubGrantIssuer {
    pub(crate) fn new(bucket: String) -> Self {
        Self { bucket }
    }
}

impl UploadGrantIssuer for StubGrantIssuer {
    fn issue(&self, key: &str, valid_for: Duration) -> Result<UploadGrant, GrantError> {
        let expires_at = Utc::now() + valid_for;
        Ok(UploadGrant {
            target_key: key.to_string(),
            url: format!(
                "https://{}/{key}?token={}&expires={}",
                self.bucket,
                Uuid::new_v4(),
                expires_at.timestamp()
            ),
            expires_at,
        })
    }
}

/// Topic publisher stand-in: logs the payload and keeps it for inspection.
pub(crate) struct TopicNotifier {
    topic: String,
    sent: Mutex<Vec<Notification>>,
}

impl TopicNotifier {
    pub(crate) fn new(topic: String) -> Self {
        Self {
            topic,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

impl Notifier for TopicNotifier {
    fn publish(&self, notification: Notification) -> Result<(), NotifyError> {
        tracing::info!(
            topic = %self.topic,
            subject = %notification.subject,
            "notification published"
        );
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification);
        Ok(())
    }
}
