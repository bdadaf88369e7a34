use std::sync::Arc;

use super::common::*;
use crate::pipeline::domain::{DeviceCondition, EvaluationStage, Money};
use crate::pipeline::queue::WorkItem;
use crate::pipeline::store::ChangeEventKind;
use crate::pipeline::worker::{
    EvaluationWorker, RandomScoring, ScoringStrategy, WorkOutcome, WorkerError,
};

fn worker_with(
    store: Arc<MemoryStore>,
    scoring: Arc<dyn ScoringStrategy>,
) -> EvaluationWorker<MemoryStore> {
    EvaluationWorker::new(store, scoring)
}

#[test]
fn processing_persists_a_concluded_report_in_one_write() {
    let store = Arc::new(MemoryStore::default());
    let worker = worker_with(
        store.clone(),
        Arc::new(FixedScoring {
            score: 8,
            trade_value: Money::from_major(1200),
        }),
    );
    let item = work_item("eval-1");

    let outcome = worker.process(&item).expect("processing succeeds");

    let record = match outcome {
        WorkOutcome::Concluded(record) => record,
        other => panic!("expected conclusion, got {other:?}"),
    };
    assert_eq!(record.stage, EvaluationStage::ReportConcluded);
    let report = record.report.expect("report attached");
    assert_eq!(report.score, 8);
    assert_eq!(report.condition, DeviceCondition::Good);
    assert_eq!(report.trade_value, Money::from_major(1200));

    let feed = store.feed();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].event, ChangeEventKind::Insert);
    assert_eq!(feed[0].new_image["status"], "REPORT_CONCLUDED");
}

#[test]
fn redelivery_is_a_no_op_with_no_second_change_event() {
    let store = Arc::new(MemoryStore::default());
    let worker = worker_with(
        store.clone(),
        Arc::new(FixedScoring {
            score: 9,
            trade_value: Money::from_major(2000),
        }),
    );
    let item = work_item("eval-1");

    let first = worker.process(&item).expect("first delivery");
    assert!(matches!(first, WorkOutcome::Concluded(_)));

    let second = worker.process(&item).expect("second delivery");
    assert_eq!(second, WorkOutcome::AlreadyConcluded);

    assert_eq!(store.feed().len(), 1, "no duplicate change event");
    let record = store
        .record(&item.evaluation_id)
        .expect("record persisted");
    let report = record.report.expect("report kept");
    assert_eq!(report.score, 9, "finalized report must not be overwritten");
}

#[test]
fn store_outage_propagates_so_the_delivery_is_not_acked() {
    let worker = EvaluationWorker::new(
        Arc::new(UnavailableStore),
        Arc::new(FixedScoring {
            score: 7,
            trade_value: Money::from_major(900),
        }),
    );

    assert!(matches!(
        worker.process(&work_item("eval-2")),
        Err(WorkerError::Store(_))
    ));
}

#[test]
fn random_scoring_stays_inside_the_reference_bounds() {
    let scoring = RandomScoring::seeded(42);
    let item = work_item("eval-3");

    for _ in 0..500 {
        let assessment = scoring.assess(&item);
        assert!(
            (5..=10).contains(&assessment.score),
            "score out of range: {}",
            assessment.score
        );
        let cents = assessment.trade_value.cents();
        assert!(
            (50_000..=300_000).contains(&cents),
            "value out of range: {cents}"
        );
    }
}

#[test]
fn seeded_scoring_is_reproducible() {
    let item = work_item("eval-4");
    let draws = |seed| {
        let scoring = RandomScoring::seeded(seed);
        (0..10).map(|_| scoring.assess(&item)).collect::<Vec<_>>()
    };

    assert_eq!(draws(7), draws(7));
}

#[test]
fn condition_follows_the_score_thresholds() {
    let store = Arc::new(MemoryStore::default());
    let cases = [
        (9, DeviceCondition::Excellent),
        (7, DeviceCondition::Good),
        (6, DeviceCondition::Fair),
    ];

    for (index, (score, expected)) in cases.into_iter().enumerate() {
        let worker = worker_with(
            store.clone(),
            Arc::new(FixedScoring {
                score,
                trade_value: Money::from_major(1000),
            }),
        );
        let item = WorkItem {
            evaluation_id: crate::pipeline::domain::EvaluationId(format!("eval-cond-{index}")),
            ..work_item("ignored")
        };
        match worker.process(&item).expect("processing succeeds") {
            WorkOutcome::Concluded(record) => {
                assert_eq!(record.report.expect("report").condition, expected);
            }
            other => panic!("expected conclusion, got {other:?}"),
        }
    }
}
