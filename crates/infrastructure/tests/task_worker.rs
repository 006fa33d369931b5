use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use stead_application::{
    CoordinationConfig, CoordinationStore, DelayedTaskService, TaskHandler, TaskWorker,
    WorkOutcome,
};
use stead_core::{AppError, AppResult};
use stead_domain::ScheduledTask;
use stead_infrastructure::InMemoryCoordinationStore;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct RecordingHandler {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl TaskHandler for RecordingHandler {
    async fn handle(&self, task: &ScheduledTask) -> AppResult<()> {
        self.seen.lock().await.push(task.queue().to_string());
        Ok(())
    }
}

struct FailingHandler;

#[async_trait]
impl TaskHandler for FailingHandler {
    async fn handle(&self, _task: &ScheduledTask) -> AppResult<()> {
        Err(AppError::Internal("smtp relay refused".to_owned()))
    }
}

fn queues(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_owned()).collect()
}

fn worker_setup(handler: Arc<RecordingHandler>) -> (DelayedTaskService, TaskWorker) {
    let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
    let config = CoordinationConfig::default().with_worker_pop_timeout(Duration::from_millis(30));
    let worker = TaskWorker::new(Arc::clone(&store), config.clone())
        .with_handler("record", handler)
        .and_then(|worker| worker.with_handler("explode", Arc::new(FailingHandler)));
    assert!(worker.is_ok());

    (
        DelayedTaskService::new(store, config),
        worker.unwrap_or_else(|_| unreachable!()),
    )
}

async fn enqueue(dispatcher: &DelayedTaskService, queue: &str, name: &str) {
    let scheduled = dispatcher
        .schedule(queue, name, vec![json!(queue)], Duration::ZERO)
        .await;
    assert!(scheduled.is_ok());
}

#[tokio::test]
async fn earlier_queues_are_drained_first() {
    let handler = Arc::new(RecordingHandler::default());
    let (dispatcher, worker) = worker_setup(Arc::clone(&handler));
    enqueue(&dispatcher, "low", "record").await;
    enqueue(&dispatcher, "high", "record").await;
    enqueue(&dispatcher, "low", "record").await;

    let order = queues(&["high", "low"]);
    assert!(matches!(worker.backlog(&order).await, Ok(3)));
    assert!(matches!(worker.backlog(&queues(&["high"])).await, Ok(1)));
    for _ in 0..3 {
        let outcome = worker.process_next(&order).await;
        assert!(matches!(outcome, Ok(WorkOutcome::Completed { .. })));
    }
    assert!(matches!(worker.process_next(&order).await, Ok(WorkOutcome::Empty)));
    assert!(matches!(worker.backlog(&order).await, Ok(0)));

    assert_eq!(*handler.seen.lock().await, vec!["high", "low", "low"]);
}

#[tokio::test]
async fn unknown_and_failing_tasks_are_reported_and_skipped() {
    let handler = Arc::new(RecordingHandler::default());
    let (dispatcher, worker) = worker_setup(Arc::clone(&handler));
    enqueue(&dispatcher, "default", "mystery").await;
    enqueue(&dispatcher, "default", "explode").await;
    enqueue(&dispatcher, "default", "record").await;

    let order = queues(&["default"]);
    assert!(matches!(
        worker.process_next(&order).await,
        Ok(WorkOutcome::UnknownTask { ref name, .. }) if name == "mystery"
    ));
    assert!(matches!(
        worker.process_next(&order).await,
        Ok(WorkOutcome::Failed { ref error, .. }) if error.contains("smtp relay refused")
    ));
    assert!(matches!(
        worker.process_next(&order).await,
        Ok(WorkOutcome::Completed { .. })
    ));
    assert_eq!(handler.seen.lock().await.len(), 1);
}

#[tokio::test]
async fn worker_needs_queues_and_named_handlers() {
    let handler = Arc::new(RecordingHandler::default());
    let (_, worker) = worker_setup(Arc::clone(&handler));

    assert!(matches!(
        worker.process_next(&[]).await,
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        worker.with_handler(" ", handler).map(|_| ()),
        Err(AppError::Validation(_))
    ));
}

#[tokio::test]
async fn run_loop_processes_until_cancelled() {
    let handler = Arc::new(RecordingHandler::default());
    let (dispatcher, worker) = worker_setup(Arc::clone(&handler));
    enqueue(&dispatcher, "default", "record").await;
    enqueue(&dispatcher, "default", "record").await;

    let cancel = CancellationToken::new();
    let running = {
        let cancel = cancel.clone();
        tokio::spawn(async move { worker.run(&queues(&["default"]), cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();
    assert!(running.await.is_ok());

    assert_eq!(handler.seen.lock().await.len(), 2);
}
