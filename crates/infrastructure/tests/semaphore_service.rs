use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use stead_application::{
    CoordinationConfig, CoordinationStore, LockService, SemaphoreService, StoreCommand,
    StoreReply, StoreTransaction,
};
use stead_core::{AppError, AppResult, HolderToken};
use stead_infrastructure::InMemoryCoordinationStore;
use tokio::task::JoinSet;

/// Store whose optimistic transactions are unreachable while plain batches
/// keep working.
struct WatchOutageStore {
    inner: InMemoryCoordinationStore,
}

#[async_trait]
impl CoordinationStore for WatchOutageStore {
    async fn execute(&self, commands: Vec<StoreCommand>) -> AppResult<Vec<StoreReply>> {
        self.inner.execute(commands).await
    }

    async fn watch(&self, _keys: &[String]) -> AppResult<Box<dyn StoreTransaction>> {
        Err(AppError::Unavailable("watch connection refused".to_owned()))
    }

    async fn blocking_pop_front(
        &self,
        keys: &[String],
        timeout: Duration,
    ) -> AppResult<Option<(String, String)>> {
        self.inner.blocking_pop_front(keys, timeout).await
    }
}

fn services() -> (SemaphoreService, LockService) {
    let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
    let config = CoordinationConfig::default();
    (
        SemaphoreService::new(Arc::clone(&store), config.clone()),
        LockService::new(store, config),
    )
}

async fn admitted(
    semaphores: &SemaphoreService,
    fair: bool,
    limit: u32,
    timeout: Duration,
) -> Option<HolderToken> {
    let acquired = if fair {
        semaphores.acquire_fair("remote", limit, timeout).await
    } else {
        semaphores.acquire("remote", limit, timeout).await
    };
    assert!(acquired.is_ok());
    acquired.unwrap_or_else(|_| unreachable!())
}

#[tokio::test]
async fn one_more_acquirer_than_the_limit_is_rejected() {
    let (semaphores, _) = services();
    let limit = 3;
    let mut acquirers = JoinSet::new();

    for arrival in 0..=limit {
        let semaphores = semaphores.clone();
        acquirers.spawn(async move {
            tokio::time::sleep(Duration::from_millis(u64::from(arrival) * 5)).await;
            semaphores
                .acquire("remote", limit, Duration::from_secs(10))
                .await
        });
    }

    let mut admissions = 0;
    let mut rejections = 0;
    while let Some(joined) = acquirers.join_next().await {
        assert!(joined.is_ok());
        let acquired = joined.unwrap_or_else(|_| unreachable!());
        assert!(acquired.is_ok());
        match acquired.unwrap_or_else(|_| unreachable!()) {
            Some(_) => admissions += 1,
            None => rejections += 1,
        }
    }

    assert_eq!(admissions, limit);
    assert_eq!(rejections, 1);
}

#[tokio::test]
async fn released_slot_is_reusable_and_release_is_idempotent() {
    let (semaphores, _) = services();
    let timeout = Duration::from_secs(10);

    let first = admitted(&semaphores, false, 1, timeout).await;
    assert!(first.is_some());
    let first = first.unwrap_or_else(|| unreachable!());
    assert!(admitted(&semaphores, false, 1, timeout).await.is_none());

    assert!(matches!(semaphores.release("remote", &first).await, Ok(true)));
    assert!(matches!(semaphores.release("remote", &first).await, Ok(false)));

    assert!(admitted(&semaphores, false, 1, timeout).await.is_some());
}

#[tokio::test]
async fn timed_out_holder_frees_its_slot_on_next_acquire() {
    let (semaphores, _) = services();
    let timeout = Duration::from_millis(40);

    let stale = admitted(&semaphores, false, 1, timeout).await;
    assert!(stale.is_some());
    let stale = stale.unwrap_or_else(|| unreachable!());

    tokio::time::sleep(Duration::from_millis(70)).await;

    assert!(admitted(&semaphores, false, 1, timeout).await.is_some());
    assert!(matches!(semaphores.refresh("remote", &stale).await, Ok(false)));
    assert!(matches!(semaphores.release("remote", &stale).await, Ok(false)));
}

#[tokio::test]
async fn refresh_keeps_a_live_holder_admitted() {
    let (semaphores, _) = services();
    let timeout = Duration::from_millis(80);

    let holder = admitted(&semaphores, false, 1, timeout).await;
    assert!(holder.is_some());
    let holder = holder.unwrap_or_else(|| unreachable!());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(matches!(semaphores.refresh("remote", &holder).await, Ok(true)));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(admitted(&semaphores, false, 1, timeout).await.is_none());
}

#[tokio::test]
async fn fair_semaphore_admits_in_arrival_order() {
    let (semaphores, _) = services();
    let timeout = Duration::from_secs(10);

    let first = admitted(&semaphores, true, 2, timeout).await;
    let second = admitted(&semaphores, true, 2, timeout).await;
    let third = admitted(&semaphores, true, 2, timeout).await;
    assert!(first.is_some());
    assert!(second.is_some());
    assert!(third.is_none());

    let first = first.unwrap_or_else(|| unreachable!());
    assert!(matches!(semaphores.release_fair("remote", &first).await, Ok(true)));

    let fourth = admitted(&semaphores, true, 2, timeout).await;
    let fifth = admitted(&semaphores, true, 2, timeout).await;
    assert!(fourth.is_some());
    assert!(fifth.is_none());

    assert!(matches!(semaphores.release_fair("remote", &first).await, Ok(false)));
}

#[tokio::test]
async fn ticket_order_survives_a_prune_cycle() {
    let (semaphores, _) = services();
    let timeout = Duration::from_millis(200);

    let expiring = admitted(&semaphores, true, 2, timeout).await;
    assert!(expiring.is_some());
    let expiring = expiring.unwrap_or_else(|| unreachable!());

    tokio::time::sleep(Duration::from_millis(120)).await;
    let earlier = admitted(&semaphores, true, 2, timeout).await;
    assert!(earlier.is_some());
    let earlier = earlier.unwrap_or_else(|| unreachable!());

    tokio::time::sleep(Duration::from_millis(120)).await;
    let later = admitted(&semaphores, true, 2, timeout).await;
    let rejected = admitted(&semaphores, true, 2, timeout).await;
    assert!(later.is_some());
    assert!(rejected.is_none());

    assert!(matches!(
        semaphores.refresh_fair("remote", &expiring).await,
        Ok(false)
    ));
    assert!(matches!(
        semaphores.refresh_fair("remote", &earlier).await,
        Ok(true)
    ));
    assert!(admitted(&semaphores, true, 2, timeout).await.is_none());
}

#[tokio::test]
async fn guarded_fair_acquire_backs_off_while_semaphore_lock_is_held() {
    let (semaphores, locks) = services();
    let timeout = Duration::from_secs(10);

    let guard = locks.acquire("remote", Duration::ZERO).await;
    assert!(guard.is_ok());
    let guard = guard
        .unwrap_or_else(|_| unreachable!())
        .unwrap_or_else(|| unreachable!());

    let blocked = semaphores.acquire_fair_guarded("remote", 1, timeout).await;
    assert!(matches!(blocked, Ok(None)));

    assert!(matches!(locks.release("remote", &guard).await, Ok(true)));

    let admitted = semaphores.acquire_fair_guarded("remote", 1, timeout).await;
    assert!(matches!(admitted, Ok(Some(_))));
    let full = semaphores.acquire_fair_guarded("remote", 1, timeout).await;
    assert!(matches!(full, Ok(None)));
}

#[tokio::test]
async fn stale_guard_lock_expires_instead_of_wedging_the_semaphore() {
    let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
    let config = CoordinationConfig {
        guarded_semaphore_lock_lease: Duration::from_millis(100),
        ..CoordinationConfig::default()
    };
    let semaphores = SemaphoreService::new(Arc::clone(&store), config.clone());
    let locks = LockService::new(store, config);
    let timeout = Duration::from_secs(10);

    let crashed = locks.acquire("remote", Duration::ZERO).await;
    assert!(matches!(crashed, Ok(Some(_))));

    let blocked = semaphores.acquire_fair_guarded("remote", 1, timeout).await;
    assert!(matches!(blocked, Ok(None)));

    tokio::time::sleep(Duration::from_millis(150)).await;

    let admitted = semaphores.acquire_fair_guarded("remote", 1, timeout).await;
    assert!(matches!(admitted, Ok(Some(_))));
}

#[tokio::test]
async fn failed_guard_release_gives_the_slot_back() {
    let inner = InMemoryCoordinationStore::new();
    let outage: Arc<dyn CoordinationStore> = Arc::new(WatchOutageStore {
        inner: inner.clone(),
    });
    let guarded = SemaphoreService::new(outage, CoordinationConfig::default());
    let direct = SemaphoreService::new(Arc::new(inner), CoordinationConfig::default());
    let timeout = Duration::from_secs(10);

    let acquired = guarded.acquire_fair_guarded("remote", 1, timeout).await;
    assert!(matches!(acquired, Err(AppError::Unavailable(_))));

    assert!(admitted(&direct, true, 1, timeout).await.is_some());
}
