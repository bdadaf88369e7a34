use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};

use crate::pipeline::domain::{EvaluationId, EvaluationRecord, EvaluationStage, Money};
use crate::pipeline::intake::{
    GrantError, IntakeConfig, IntakeService, UploadGrant, UploadGrantIssuer,
};
use crate::pipeline::notify::{Notification, Notifier, NotifyError};
use crate::pipeline::queue::{QueueError, WorkItem, WorkQueue};
use crate::pipeline::store::{
    ChangeRecord, EvaluationStore, ReportCommit, StageTransition, StoreError,
};
use crate::pipeline::worker::{Assessment, ScoringStrategy};

/// In-memory state store that captures its change feed for assertions.
#[derive(Default)]
pub(super) struct MemoryStore {
    records: Mutex<HashMap<EvaluationId, EvaluationRecord>>,
    feed: Mutex<Vec<ChangeRecord>>,
}

impl MemoryStore {
    pub(super) fn feed(&self) -> Vec<ChangeRecord> {
        self.feed.lock().expect("feed mutex poisoned").clone()
    }

    pub(super) fn record(&self, id: &EvaluationId) -> Option<EvaluationRecord> {
        self.records
            .lock()
            .expect("store mutex poisoned")
            .get(id)
            .cloned()
    }
}

impl EvaluationStore for MemoryStore {
    fn conclude_report(&self, record: EvaluationRecord) -> Result<ReportCommit, StoreError> {
        let mut records = self.records.lock().expect("store mutex poisoned");
        match records.get(&record.evaluation_id) {
            Some(existing)
                if existing.report.is_some()
                    || existing.stage >= EvaluationStage::ReportConcluded =>
            {
                Ok(ReportCommit::AlreadyConcluded)
            }
            Some(_) => {
                records.insert(record.evaluation_id.clone(), record.clone());
                self.feed
                    .lock()
                    .expect("feed mutex poisoned")
                    .push(ChangeRecord::modify(&record));
                Ok(ReportCommit::Concluded(record))
            }
            None => {
                records.insert(record.evaluation_id.clone(), record.clone());
                self.feed
                    .lock()
                    .expect("feed mutex poisoned")
                    .push(ChangeRecord::insert(&record));
                Ok(ReportCommit::Concluded(record))
            }
        }
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
        self.feed
            .lock()
            .expect("feed mutex poisoned")
            .push(ChangeRecord::modify(&updated));
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

/// Store that fails every call, for redelivery paths.
pub(super) struct UnavailableStore;

impl EvaluationStore for UnavailableStore {
    fn conclude_report(&self, _record: EvaluationRecord) -> Result<ReportCommit, StoreError> {
        Err(StoreError::Unavailable("table offline".to_string()))
    }

    fn advance_stage(
        &self,
        _id: &EvaluationId,
        _expected: EvaluationStage,
        _next: EvaluationStage,
    ) -> Result<StageTransition, StoreError> {
        Err(StoreError::Unavailable("table offline".to_string()))
    }

    fn fetch(&self, _id: &EvaluationId) -> Result<Option<EvaluationRecord>, StoreError> {
        Err(StoreError::Unavailable("table offline".to_string()))
    }
}

#[derive(Default)]
pub(super) struct MemoryQueue {
    items: Mutex<Vec<WorkItem>>,
}

impl MemoryQueue {
    pub(super) fn items(&self) -> Vec<WorkItem> {
        self.items.lock().expect("queue mutex poisoned").clone()
    }
}

impl WorkQueue for MemoryQueue {
    fn enqueue(&self, item: WorkItem) -> Result<(), QueueError> {
        self.items.lock().expect("queue mutex poisoned").push(item);
        Ok(())
    }
}

pub(super) struct UnavailableQueue;

impl WorkQueue for UnavailableQueue {
    fn enqueue(&self, _item: WorkItem) -> Result<(), QueueError> {
        Err(QueueError::Unavailable("queue offline".to_string()))
    }
}

/// Grant issuer recording every issued key.
#[derive(Default)]
pub(super) struct MemoryGrants {
    issued: Mutex<Vec<String>>,
}

impl MemoryGrants {
    pub(super) fn issued(&self) -> Vec<String> {
        self.issued.lock().expect("grant mutex poisoned").clone()
    }
}

impl UploadGrantIssuer for MemoryGrants {
    fn issue(&self, key: &str, valid_for: Duration) -> Result<UploadGrant, GrantError> {
        self.issued
            .lock()
            .expect("grant mutex poisoned")
            .push(key.to_string());
        Ok(UploadGrant {
            target_key: key.to_string(),
            url: format!("https://blob.test/{key}"),
            expires_at: Utc::now() + valid_for,
        })
    }
}

pub(super) struct FailingGrants;

impl UploadGrantIssuer for FailingGrants {
    fn issue(&self, _key: &str, _valid_for: Duration) -> Result<UploadGrant, GrantError> {
        Err(GrantError::Unavailable("bucket offline".to_string()))
    }
}

#[derive(Default)]
pub(super) struct MemoryNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub(super) fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

impl Notifier for MemoryNotifier {
    fn publish(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification);
        Ok(())
    }
}

pub(super) struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn publish(&self, _notification: Notification) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("topic offline".to_string()))
    }
}

/// Deterministic scoring for pipeline tests.
pub(super) struct FixedScoring {
    pub(super) score: u8,
    pub(super) trade_value: Money,
}

impl ScoringStrategy for FixedScoring {
    fn assess(&self, _item: &WorkItem) -> Assessment {
        Assessment {
            score: self.score,
            trade_value: self.trade_value,
        }
    }
}

pub(super) fn intake_service(
    queue: Arc<MemoryQueue>,
    grants: Arc<MemoryGrants>,
) -> IntakeService<MemoryQueue, MemoryGrants> {
    IntakeService::new(queue, grants, IntakeConfig::default())
}

pub(super) fn work_item(id: &str) -> WorkItem {
    WorkItem {
        evaluation_id: EvaluationId(id.to_string()),
        user_id: "u1".to_string(),
        device_model: "Pixel 6".to_string(),
        upload_prefix: format!("uploads/u1/{id}/"),
        stage: EvaluationStage::PendingUpload,
    }
}
