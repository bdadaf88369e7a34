use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryEvaluationStore, InMemoryWorkQueue, StubGrantIssuer, TopicNotifier};
use crate::routes::with_ops_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tradein::config::AppConfig;
use tradein::error::AppError;
use tradein::pipeline::{
    evaluation_router, CandidateInventory, ChangeRecord, ClosestPrice, EvaluationStore,
    EvaluationWorker, IntakeConfig, IntakeService, Notifier, PipelineApi, RandomScoring,
    RetryPolicy, SuggestionEngine,
};
use tradein::telemetry;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let queue = Arc::new(InMemoryWorkQueue::new(RetryPolicy::new(
        config.pipeline.max_delivery_attempts,
    )));
    let (store, mut feed) = InMemoryEvaluationStore::with_feed();
    let grants = Arc::new(StubGrantIssuer::new(config.pipeline.storage_bucket.clone()));
    let notifier = Arc::new(TopicNotifier::new(
        config.pipeline.notification_topic.clone(),
    ));

    let intake = Arc::new(IntakeService::new(
        queue.clone(),
        grants,
        IntakeConfig::default(),
    ));
    let worker = EvaluationWorker::new(store.clone(), Arc::new(RandomScoring::from_entropy()));
    let engine = SuggestionEngine::new(
        store.clone(),
        notifier,
        CandidateInventory::standard(),
        Arc::new(ClosestPrice),
    );

    // Evaluation worker loop: failures are not acked, they go back through
    // the redelivery budget.
    let worker_queue = queue.clone();
    tokio::spawn(async move {
        loop {
            let delivery = worker_queue.next().await;
            if let Err(error) = worker.process(&delivery.item) {
                tracing::warn!(
                    evaluation_id = %delivery.item.evaluation_id,
                    %error,
                    "work item processing failed"
                );
                worker_queue.retry(delivery);
            }
        }
    });

    // Change-feed subscriber loop: one event at a time, per-item isolation.
    // Store outages get the same redelivery budget as the work queue.
    let feed_policy = RetryPolicy::new(config.pipeline.max_delivery_attempts);
    tokio::spawn(async move {
        while let Some(event) = feed.recv().await {
            consume_change_event(&engine, &event, feed_policy);
        }
    });

    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        queue: queue.clone(),
    };

    let app = with_ops_routes(evaluation_router(PipelineApi {
        intake,
        store: store.clone(),
    }))
    .layer(Extension(app_state))
    .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "trade-in evaluation pipeline ready");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Drives one change event through the suggestion engine.
///
/// Only a store outage surfaces as an error, so the event is re-offered in
/// place, up to the same redelivery budget the work queue applies, before
/// it is dropped.
fn consume_change_event<S, N>(
    engine: &SuggestionEngine<S, N>,
    event: &ChangeRecord,
    policy: RetryPolicy,
) where
    S: EvaluationStore + 'static,
    N: Notifier + 'static,
{
    for attempt in 1..=policy.max_attempts() {
        match engine.handle(event) {
            Ok(_) => return,
            Err(error) if attempt < policy.max_attempts() => {
                tracing::warn!(%error, attempt, "change event handling failed, redelivering");
            }
            Err(error) => {
                tracing::error!(
                    %error,
                    attempt,
                    "change event dropped after exhausting its redelivery budget"
                );
            }
        }
    }
}
