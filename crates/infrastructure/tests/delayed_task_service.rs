use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use stead_application::{
    CoordinationConfig, CoordinationStore, DELAYED_TASKS_KEY, DelayedTaskService, LockService,
    PollOutcome, StoreCommand,
};
use stead_infrastructure::InMemoryCoordinationStore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

fn dispatcher() -> (Arc<dyn CoordinationStore>, DelayedTaskService) {
    let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
    let service = DelayedTaskService::new(Arc::clone(&store), CoordinationConfig::default());
    (store, service)
}

async fn ready_count(service: &DelayedTaskService, queue: &str) -> usize {
    let ready = service.ready_tasks(queue).await;
    assert!(ready.is_ok());
    ready.unwrap_or_default().len()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_pollers_promote_each_task_exactly_once() {
    let (_, service) = dispatcher();
    let mut scheduled = HashSet::new();

    for (index, delay) in [0, 0, 60, 60].into_iter().enumerate() {
        let task_id = service
            .schedule(
                "email",
                "send_sold_email",
                vec![json!(index)],
                Duration::from_millis(delay),
            )
            .await;
        assert!(task_id.is_ok());
        scheduled.insert(task_id.unwrap_or_else(|_| unreachable!()));
    }

    assert_eq!(ready_count(&service, "email").await, 2);
    assert!(matches!(service.delayed_count().await, Ok(2)));

    tokio::time::sleep(Duration::from_millis(90)).await;

    let cancel = CancellationToken::new();
    let mut pollers = JoinSet::new();
    for _ in 0..3 {
        let service = service.clone();
        let cancel = cancel.clone();
        pollers.spawn(async move { service.run_poll_loop(cancel).await });
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    cancel.cancel();
    while let Some(joined) = pollers.join_next().await {
        assert!(joined.is_ok());
    }

    let ready = service.ready_tasks("email").await;
    assert!(ready.is_ok());
    let ready = ready.unwrap_or_default();
    let promoted: HashSet<_> = ready.iter().map(|task| task.id().clone()).collect();

    assert_eq!(ready.len(), 4);
    assert_eq!(promoted, scheduled);
    assert!(matches!(service.delayed_count().await, Ok(0)));
}

#[tokio::test]
async fn task_is_not_promoted_before_it_is_due() {
    let (_, service) = dispatcher();

    let scheduled = service
        .schedule("email", "send_sold_email", Vec::new(), Duration::from_secs(30))
        .await;
    assert!(scheduled.is_ok());

    assert!(matches!(service.poll_once().await, Ok(PollOutcome::Idle)));
    assert_eq!(ready_count(&service, "email").await, 0);
}

#[tokio::test]
async fn due_task_lands_on_its_own_queue() {
    let (_, service) = dispatcher();

    let scheduled = service
        .schedule("billing", "charge", vec![json!({"cents": 97})], Duration::from_millis(10))
        .await;
    assert!(scheduled.is_ok());
    let task_id = scheduled.unwrap_or_else(|_| unreachable!());

    tokio::time::sleep(Duration::from_millis(30)).await;

    assert!(matches!(service.poll_once().await, Ok(PollOutcome::Promoted)));
    assert!(matches!(service.poll_once().await, Ok(PollOutcome::Idle)));

    let ready = service.ready_tasks("billing").await;
    assert!(ready.is_ok());
    let ready = ready.unwrap_or_default();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].id(), &task_id);
    assert_eq!(ready[0].name().as_str(), "charge");
    assert_eq!(ready[0].args(), &[json!({"cents": 97})]);
    assert_eq!(ready_count(&service, "email").await, 0);
}

#[tokio::test]
async fn withdrawn_task_is_dropped_instead_of_promoted() {
    let (_, service) = dispatcher();

    let scheduled = service
        .schedule("email", "send_sold_email", Vec::new(), Duration::from_millis(10))
        .await;
    assert!(scheduled.is_ok());
    let task_id = scheduled.unwrap_or_else(|_| unreachable!());

    assert!(matches!(service.cancel(&task_id).await, Ok(true)));
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert!(matches!(service.poll_once().await, Ok(PollOutcome::Withdrawn)));
    assert_eq!(ready_count(&service, "email").await, 0);
    assert!(matches!(service.delayed_count().await, Ok(0)));
    assert!(matches!(service.cancel(&task_id).await, Ok(false)));
}

#[tokio::test]
async fn immediate_tasks_cannot_be_withdrawn() {
    let (_, service) = dispatcher();

    let scheduled = service
        .schedule("email", "send_sold_email", Vec::new(), Duration::ZERO)
        .await;
    assert!(scheduled.is_ok());
    let task_id = scheduled.unwrap_or_else(|_| unreachable!());

    assert!(matches!(service.cancel(&task_id).await, Ok(false)));
    assert_eq!(ready_count(&service, "email").await, 1);
}

#[tokio::test]
async fn sub_millisecond_delays_run_instead_of_being_dropped() {
    let (_, service) = dispatcher();

    let immediate = service
        .schedule("email", "send", Vec::new(), Duration::from_nanos(500))
        .await;
    assert!(immediate.is_ok());
    let barely_delayed = service
        .schedule("email", "send", Vec::new(), Duration::from_micros(1))
        .await;
    assert!(barely_delayed.is_ok());

    tokio::time::sleep(Duration::from_millis(5)).await;

    assert!(matches!(service.poll_once().await, Ok(PollOutcome::Promoted)));
    assert!(matches!(service.poll_once().await, Ok(PollOutcome::Idle)));
    assert_eq!(ready_count(&service, "email").await, 2);
}

#[tokio::test]
async fn undecodable_payload_is_discarded() {
    let (store, service) = dispatcher();

    let inserted = store
        .execute_one(StoreCommand::sorted_add(DELAYED_TASKS_KEY, "not a task", 0.0))
        .await;
    assert!(inserted.is_ok());

    assert!(matches!(service.poll_once().await, Ok(PollOutcome::Discarded)));
    assert!(matches!(service.delayed_count().await, Ok(0)));
}

#[tokio::test]
async fn held_task_lock_means_contention_not_error() {
    let (store, service) = dispatcher();
    let locks = LockService::new(store, CoordinationConfig::default());

    let scheduled = service
        .schedule("email", "send_sold_email", Vec::new(), Duration::from_millis(5))
        .await;
    assert!(scheduled.is_ok());
    let task_id = scheduled.unwrap_or_else(|_| unreachable!());

    let guard = locks.acquire(task_id.as_str(), Duration::ZERO).await;
    assert!(matches!(guard, Ok(Some(_))));
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(matches!(service.poll_once().await, Ok(PollOutcome::Contended)));
    assert!(matches!(service.delayed_count().await, Ok(1)));
}
