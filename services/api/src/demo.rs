use crate::infra::{InMemoryEvaluationStore, InMemoryWorkQueue, StubGrantIssuer, TopicNotifier};
use clap::Args;
use std::sync::Arc;
use tradein::error::AppError;
use tradein::pipeline::{
    CandidateInventory, ClosestPrice, EvaluationWorker, IntakeConfig, IntakeRequest,
    IntakeService, RandomScoring, RetryPolicy, SuggestionEngine, SuggestionOutcome, WorkOutcome,
};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Seed for the stub scoring draw, for reproducible runs.
    #[arg(long)]
    pub(crate) seed: Option<u64>,
    /// Number of trade-in requests to push through the pipeline.
    #[arg(long, default_value_t = 3)]
    pub(crate) requests: usize,
}

const SAMPLE_DEVICES: &[(&str, &str)] = &[
    ("u-ana", "Pixel 6"),
    ("u-bruno", "iPhone 11"),
    ("u-carla", "Galaxy S21"),
];

/// Push a handful of requests through the whole pipeline in-process and
/// print what every stage did.
pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let queue = Arc::new(InMemoryWorkQueue::new(RetryPolicy::new(5)));
    let (store, mut feed) = InMemoryEvaluationStore::with_feed();
    let notifier = Arc::new(TopicNotifier::new("local/trade-up-suggestions".to_string()));

    let intake = IntakeService::new(
        queue.clone(),
        Arc::new(StubGrantIssuer::new("local/device-photos".to_string())),
        IntakeConfig::default(),
    );
    let scoring = match args.seed {
        Some(seed) => RandomScoring::seeded(seed),
        None => RandomScoring::from_entropy(),
    };
    let worker = EvaluationWorker::new(store.clone(), Arc::new(scoring));
    let engine = SuggestionEngine::new(
        store.clone(),
        notifier.clone(),
        CandidateInventory::standard(),
        Arc::new(ClosestPrice),
    );

    println!("== Intake ==");
    for index in 0..args.requests {
        let (user_id, device_model) = SAMPLE_DEVICES[index % SAMPLE_DEVICES.len()];
        let receipt = intake.submit(IntakeRequest {
            user_id: user_id.to_string(),
            device_model: device_model.to_string(),
        })?;
        println!(
            "accepted {device_model} from {user_id}: evaluation {} ({} upload grants)",
            receipt.evaluation_id,
            receipt.upload_grants.len()
        );
    }

    println!("\n== Evaluation worker ==");
    while let Some(delivery) = queue.try_next() {
        match worker.process(&delivery.item) {
            Ok(WorkOutcome::Concluded(record)) => {
                if let Some(report) = &record.report {
                    println!(
                        "evaluation {}: score {}, condition {}, trade value {}",
                        record.evaluation_id,
                        report.score,
                        report.condition.label(),
                        report.trade_value
                    );
                }
            }
            Ok(WorkOutcome::AlreadyConcluded) => {
                println!("evaluation {}: already concluded", delivery.item.evaluation_id);
            }
            Err(error) => {
                eprintln!(
                    "evaluation {} failed: {error}",
                    delivery.item.evaluation_id
                );
                queue.retry(delivery);
            }
        }
    }

    println!("\n== Suggestion engine ==");
    while let Ok(event) = feed.try_recv() {
        match engine.handle(&event) {
            Ok(SuggestionOutcome::Suggested(recommendation)) => {
                println!(
                    "evaluation {}: {:?}",
                    recommendation.evaluation_id, recommendation.outcome
                );
            }
            Ok(SuggestionOutcome::Skipped(_)) => {}
            Err(error) => eprintln!("change event failed: {error}"),
        }
    }

    println!("\n== Notifications ==");
    for notification in notifier.sent() {
        println!("{}\n  {}", notification.subject, notification.message);
    }

    let dead = queue.dead_letters();
    if !dead.is_empty() {
        println!("\n== Dead letters ==");
        for delivery in dead {
            println!(
                "evaluation {} after {} attempts",
                delivery.item.evaluation_id, delivery.attempt
            );
        }
    }

    Ok(())
}
