//! Stead worker runtime: delayed-task pollers plus a ready-queue consumer.

#![forbid(unsafe_code)]

mod worker_config;

use std::sync::Arc;

use async_trait::async_trait;
use stead_application::{
    CoordinationConfig, CoordinationStore, DelayedTaskService, TaskHandler, TaskWorker,
};
use stead_core::{AppError, AppResult};
use stead_domain::ScheduledTask;
use stead_infrastructure::RedisCoordinationStore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::worker_config::WorkerConfig;

/// Handler that only records the task it was given.
struct LoggingTaskHandler {
    worker_id: String,
}

#[async_trait]
impl TaskHandler for LoggingTaskHandler {
    async fn handle(&self, task: &ScheduledTask) -> AppResult<()> {
        info!(
            worker_id = %self.worker_id,
            task_id = %task.id(),
            queue = %task.queue(),
            name = %task.name(),
            args = ?task.args(),
            "task received"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let client = redis::Client::open(config.redis_url.as_str())
        .map_err(|error| AppError::Validation(format!("invalid REDIS_URL: {error}")))?;
    let store: Arc<dyn CoordinationStore> = Arc::new(RedisCoordinationStore::new(
        client,
        config.key_prefix.as_str(),
    ));
    let coordination = CoordinationConfig::default().with_poll_interval(config.poll_interval);

    let dispatcher = DelayedTaskService::new(Arc::clone(&store), coordination.clone());
    let worker = build_task_worker(store, coordination, &config)?;

    info!(
        worker_id = %config.worker_id,
        key_prefix = %config.key_prefix,
        queues = ?config.queues,
        pollers = config.pollers,
        poll_interval_ms = config.poll_interval.as_millis(),
        "stead-worker started"
    );
    match worker.backlog(&config.queues).await {
        Ok(backlog) => info!(backlog, "ready tasks waiting at startup"),
        Err(error) => warn!(error = %error, "failed to read ready queue backlog"),
    }

    let cancel = CancellationToken::new();
    let mut runners = JoinSet::new();
    for _ in 0..config.pollers {
        let dispatcher = dispatcher.clone();
        let cancel = cancel.clone();
        runners.spawn(async move { dispatcher.run_poll_loop(cancel).await });
    }
    {
        let cancel = cancel.clone();
        let queues = config.queues.clone();
        runners.spawn(async move { worker.run(&queues, cancel).await });
    }

    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "failed to listen for shutdown signal");
    }
    info!(worker_id = %config.worker_id, "shutdown requested");
    cancel.cancel();

    while let Some(joined) = runners.join_next().await {
        if let Err(error) = joined {
            warn!(error = %error, "worker task ended abnormally");
        }
    }

    info!(worker_id = %config.worker_id, "stead-worker stopped");
    Ok(())
}

fn build_task_worker(
    store: Arc<dyn CoordinationStore>,
    coordination: CoordinationConfig,
    config: &WorkerConfig,
) -> AppResult<TaskWorker> {
    let handler: Arc<dyn TaskHandler> = Arc::new(LoggingTaskHandler {
        worker_id: config.worker_id.clone(),
    });

    config
        .log_tasks
        .iter()
        .try_fold(TaskWorker::new(store, coordination), |worker, name| {
            worker.with_handler(name.as_str(), Arc::clone(&handler))
        })
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
