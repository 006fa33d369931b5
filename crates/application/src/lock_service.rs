//! Lease-based mutual exclusion keyed by name.
//!
//! A lock is a single string key `lock:<name>` whose value is the holder
//! token of the current owner. Acquisition relies on the store's atomic
//! set-if-absent; release and renewal check ownership inside an optimistic
//! transaction so a caller can never delete or extend somebody else's lock.

use std::sync::Arc;
use std::time::Duration;

use stead_core::{AppError, AppResult, HolderToken};
use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::coordination_config::CoordinationConfig;
use crate::coordination_ports::{CoordinationStore, KeyTtl, StoreCommand, StoreReply, next_reply};
use crate::optimistic::{OptimisticPlan, run_optimistic};

/// Returns the store key backing lock `name`.
#[must_use]
pub fn lock_key(name: &str) -> String {
    format!("lock:{name}")
}

/// Application service for named locks.
#[derive(Clone)]
pub struct LockService {
    store: Arc<dyn CoordinationStore>,
    config: CoordinationConfig,
}

impl LockService {
    /// Creates a new lock service.
    #[must_use]
    pub fn new(store: Arc<dyn CoordinationStore>, config: CoordinationConfig) -> Self {
        Self { store, config }
    }

    /// Tries to take lock `name` until `acquire_timeout` elapses.
    ///
    /// The key carries no expiry; a holder that crashes keeps the lock until
    /// a caller of [`LockService::acquire_with_timeout`] arms a lease on it.
    /// Returns `None` when the lock stayed busy.
    pub async fn acquire(
        &self,
        name: &str,
        acquire_timeout: Duration,
    ) -> AppResult<Option<HolderToken>> {
        self.acquire_until(name, acquire_timeout, None).await
    }

    /// Tries to take lock `name` with a lease of `lease_timeout`.
    ///
    /// Every failed attempt also arms the lease on a held lock that has no
    /// expiry, so a lock left behind by a crashed plain acquirer heals itself.
    pub async fn acquire_with_timeout(
        &self,
        name: &str,
        acquire_timeout: Duration,
        lease_timeout: Duration,
    ) -> AppResult<Option<HolderToken>> {
        validate_lease(lease_timeout)?;
        self.acquire_until(name, acquire_timeout, Some(lease_timeout))
            .await
    }

    /// Releases lock `name` if `token` still holds it.
    ///
    /// Returns `false` when the lock is held by someone else or already gone.
    pub async fn release(&self, name: &str, token: &HolderToken) -> AppResult<bool> {
        validate_name(name)?;
        let key = lock_key(name);

        let released = run_optimistic(
            self.store.as_ref(),
            std::slice::from_ref(&key),
            &[StoreCommand::get(key.as_str())],
            self.config.optimistic_retry_budget,
            |replies| {
                if !held_by(replies, token)? {
                    return Ok(OptimisticPlan::Abandon(false));
                }

                Ok(OptimisticPlan::Commit {
                    commands: vec![StoreCommand::delete(key.as_str())],
                    outcome: true,
                })
            },
        )
        .await?;

        debug!(lock = name, released, "lock release finished");
        Ok(released)
    }

    /// Re-arms the lease of lock `name` if `token` still holds it.
    pub async fn renew(
        &self,
        name: &str,
        token: &HolderToken,
        lease_timeout: Duration,
    ) -> AppResult<bool> {
        validate_name(name)?;
        validate_lease(lease_timeout)?;
        let key = lock_key(name);

        run_optimistic(
            self.store.as_ref(),
            std::slice::from_ref(&key),
            &[StoreCommand::get(key.as_str())],
            self.config.optimistic_retry_budget,
            |replies| {
                if !held_by(replies, token)? {
                    return Ok(OptimisticPlan::Abandon(false));
                }

                Ok(OptimisticPlan::Commit {
                    commands: vec![StoreCommand::expire(key.as_str(), lease_timeout)],
                    outcome: true,
                })
            },
        )
        .await
    }

    async fn acquire_until(
        &self,
        name: &str,
        acquire_timeout: Duration,
        lease: Option<Duration>,
    ) -> AppResult<Option<HolderToken>> {
        validate_name(name)?;
        let key = lock_key(name);
        let token = HolderToken::generate();
        let deadline = Instant::now() + acquire_timeout;

        loop {
            let acquired = self
                .store
                .execute_one(StoreCommand::set_if_absent(
                    key.as_str(),
                    token.as_str(),
                    lease,
                ))
                .await?
                .into_flag()?;

            if acquired {
                debug!(lock = name, "lock acquired");
                return Ok(Some(token));
            }

            if let Some(lease) = lease {
                self.arm_missing_lease(key.as_str(), lease).await?;
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(lock = name, "lock still busy at acquire deadline");
                return Ok(None);
            }

            sleep(self.config.lock_retry_interval.min(deadline - now)).await;
        }
    }

    async fn arm_missing_lease(&self, key: &str, lease: Duration) -> AppResult<()> {
        let ttl = self
            .store
            .execute_one(StoreCommand::time_to_live(key))
            .await?
            .into_ttl()?;

        if ttl == KeyTtl::Persistent {
            debug!(key, "arming lease on lock without expiry");
            self.store
                .execute_one(StoreCommand::expire(key, lease))
                .await?;
        }

        Ok(())
    }
}

fn held_by(replies: Vec<StoreReply>, token: &HolderToken) -> AppResult<bool> {
    let holder = next_reply(&mut replies.into_iter())?.into_optional_text()?;
    Ok(holder.as_deref() == Some(token.as_str()))
}

fn validate_name(name: &str) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("lock name must not be empty".to_owned()));
    }

    Ok(())
}

fn validate_lease(lease_timeout: Duration) -> AppResult<()> {
    if lease_timeout.is_zero() {
        return Err(AppError::Validation(
            "lock lease must be greater than zero".to_owned(),
        ));
    }

    Ok(())
}
