use std::sync::Arc;
use std::time::Duration;

use stead_application::{
    CoordinationConfig, CoordinationStore, KeyTtl, LockService, StoreCommand,
};
use stead_core::{AppError, HolderToken};
use stead_infrastructure::InMemoryCoordinationStore;
use tokio::task::JoinSet;

fn lock_service() -> (Arc<dyn CoordinationStore>, LockService) {
    let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
    let locks = LockService::new(Arc::clone(&store), CoordinationConfig::default());
    (store, locks)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acquirers_get_exactly_one_token() {
    let (_, locks) = lock_service();
    let mut contenders = JoinSet::new();

    for _ in 0..8 {
        let locks = locks.clone();
        contenders.spawn(async move {
            locks
                .acquire("market", Duration::from_millis(50))
                .await
        });
    }

    let mut holders = 0;
    while let Some(joined) = contenders.join_next().await {
        assert!(joined.is_ok());
        let acquired = joined.unwrap_or_else(|_| unreachable!());
        assert!(acquired.is_ok());
        if acquired.unwrap_or_else(|_| unreachable!()).is_some() {
            holders += 1;
        }
    }

    assert_eq!(holders, 1);
}

#[tokio::test]
async fn released_lock_can_be_acquired_again() {
    let (_, locks) = lock_service();

    let first = locks.acquire("market", Duration::ZERO).await;
    assert!(first.is_ok());
    let first = first.unwrap_or_else(|_| unreachable!());
    assert!(first.is_some());
    let first = first.unwrap_or_else(|| unreachable!());

    let blocked = locks.acquire("market", Duration::from_millis(30)).await;
    assert!(matches!(blocked, Ok(None)));

    assert!(matches!(locks.release("market", &first).await, Ok(true)));

    let second = locks.acquire("market", Duration::ZERO).await;
    assert!(matches!(second, Ok(Some(_))));
}

#[tokio::test]
async fn crashed_holder_lease_expires() {
    let (_, locks) = lock_service();
    let lease = Duration::from_millis(50);

    let crashed = locks
        .acquire_with_timeout("market", Duration::ZERO, lease)
        .await;
    assert!(matches!(crashed, Ok(Some(_))));

    let blocked = locks
        .acquire_with_timeout("market", Duration::ZERO, lease)
        .await;
    assert!(matches!(blocked, Ok(None)));

    tokio::time::sleep(Duration::from_millis(80)).await;

    let recovered = locks
        .acquire_with_timeout("market", Duration::ZERO, lease)
        .await;
    assert!(matches!(recovered, Ok(Some(_))));
}

#[tokio::test]
async fn timed_acquire_arms_lease_left_off_by_plain_holder() {
    let (store, locks) = lock_service();

    let plain = locks.acquire("market", Duration::ZERO).await;
    assert!(matches!(plain, Ok(Some(_))));

    let blocked = locks
        .acquire_with_timeout("market", Duration::ZERO, Duration::from_millis(40))
        .await;
    assert!(matches!(blocked, Ok(None)));

    let ttl = store
        .execute_one(StoreCommand::time_to_live("lock:market"))
        .await
        .and_then(|reply| reply.into_ttl());
    assert!(matches!(ttl, Ok(KeyTtl::Expiring(_))));

    let recovered = locks
        .acquire_with_timeout("market", Duration::from_millis(500), Duration::from_secs(1))
        .await;
    assert!(matches!(recovered, Ok(Some(_))));
}

#[tokio::test]
async fn release_by_non_holder_leaves_lock_untouched() {
    let (_, locks) = lock_service();

    let holder = locks.acquire("market", Duration::ZERO).await;
    assert!(matches!(holder, Ok(Some(_))));

    let stranger = HolderToken::generate();
    assert!(matches!(locks.release("market", &stranger).await, Ok(false)));

    let blocked = locks.acquire("market", Duration::ZERO).await;
    assert!(matches!(blocked, Ok(None)));
}

#[tokio::test]
async fn releasing_twice_reports_false() {
    let (_, locks) = lock_service();

    let token = locks.acquire("market", Duration::ZERO).await;
    assert!(token.is_ok());
    let token = token
        .unwrap_or_else(|_| unreachable!())
        .unwrap_or_else(|| unreachable!());

    assert!(matches!(locks.release("market", &token).await, Ok(true)));
    assert!(matches!(locks.release("market", &token).await, Ok(false)));
}

#[tokio::test]
async fn renew_extends_only_the_holders_lease() {
    let (_, locks) = lock_service();
    let lease = Duration::from_millis(60);

    let token = locks
        .acquire_with_timeout("market", Duration::ZERO, lease)
        .await;
    assert!(token.is_ok());
    let token = token
        .unwrap_or_else(|_| unreachable!())
        .unwrap_or_else(|| unreachable!());

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(matches!(
        locks
            .renew("market", &token, Duration::from_secs(5))
            .await,
        Ok(true)
    ));
    assert!(matches!(
        locks
            .renew("market", &HolderToken::generate(), Duration::from_secs(5))
            .await,
        Ok(false)
    ));

    tokio::time::sleep(Duration::from_millis(40)).await;
    let blocked = locks
        .acquire_with_timeout("market", Duration::ZERO, lease)
        .await;
    assert!(matches!(blocked, Ok(None)));
}

#[tokio::test]
async fn invalid_names_and_leases_are_rejected() {
    let (_, locks) = lock_service();

    assert!(matches!(
        locks.acquire(" ", Duration::ZERO).await,
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        locks
            .acquire_with_timeout("market", Duration::ZERO, Duration::ZERO)
            .await,
        Err(AppError::Validation(_))
    ));
}
