use std::time::Duration;

use stead_core::{AppResult, HolderToken};
use tracing::{debug, warn};

use crate::clock::{duration_millis, unix_millis_now};
use crate::coordination_ports::{ScoreBound, StoreCommand, next_reply};

use super::{SemaphoreKeys, SemaphoreService, admitted, validate_acquire};

impl SemaphoreService {
    /// Tries to take one of `limit` slots of fair semaphore `name`.
    ///
    /// Slots are granted in ticket order, so callers are admitted in the
    /// order they arrived regardless of clock skew between them.
    pub async fn acquire_fair(
        &self,
        name: &str,
        limit: u32,
        timeout: Duration,
    ) -> AppResult<Option<HolderToken>> {
        validate_acquire(limit, timeout)?;
        let keys = SemaphoreKeys::for_name(name)?;
        let token = HolderToken::generate();
        let now = unix_millis_now();

        let replies = self
            .store
            .execute(vec![
                StoreCommand::sorted_remove_range_by_score(
                    keys.holders.as_str(),
                    ScoreBound::NegativeInfinity,
                    ScoreBound::Inclusive(now - duration_millis(timeout)),
                ),
                StoreCommand::sorted_retain_shared(keys.owners.as_str(), keys.holders.as_str()),
                StoreCommand::increment(keys.counter.as_str()),
            ])
            .await?;

        let mut replies = replies.into_iter();
        next_reply(&mut replies)?;
        next_reply(&mut replies)?;
        let ticket = next_reply(&mut replies)?.into_integer()?;

        let replies = self
            .store
            .execute(vec![
                StoreCommand::sorted_add(keys.holders.as_str(), token.as_str(), now),
                StoreCommand::sorted_add(keys.owners.as_str(), token.as_str(), ticket as f64),
                StoreCommand::sorted_rank(keys.owners.as_str(), token.as_str()),
            ])
            .await?;

        let mut replies = replies.into_iter();
        next_reply(&mut replies)?;
        next_reply(&mut replies)?;
        let rank = next_reply(&mut replies)?.into_optional_integer()?;

        if admitted(rank, limit) {
            debug!(semaphore = name, ticket, ?rank, "fair semaphore acquired");
            return Ok(Some(token));
        }

        self.store
            .execute(vec![
                StoreCommand::sorted_remove(keys.holders.as_str(), token.as_str()),
                StoreCommand::sorted_remove(keys.owners.as_str(), token.as_str()),
            ])
            .await?;
        debug!(semaphore = name, ticket, limit, "fair semaphore full");
        Ok(None)
    }

    /// Gives back the fair slot held by `token`.
    ///
    /// Returns `false` when the holder had already timed out or been released.
    pub async fn release_fair(&self, name: &str, token: &HolderToken) -> AppResult<bool> {
        let keys = SemaphoreKeys::for_name(name)?;
        let replies = self
            .store
            .execute(vec![
                StoreCommand::sorted_remove(keys.holders.as_str(), token.as_str()),
                StoreCommand::sorted_remove(keys.owners.as_str(), token.as_str()),
            ])
            .await?;

        let removed = next_reply(&mut replies.into_iter())?.into_integer()?;
        Ok(removed > 0)
    }

    /// Extends the tenure of the fair slot held by `token`.
    ///
    /// Re-stamping a holder that had already been pruned would add it back
    /// with its old ticket, so a refresh that inserts a new entry gives the
    /// slot up entirely and returns `false`.
    pub async fn refresh_fair(&self, name: &str, token: &HolderToken) -> AppResult<bool> {
        let keys = SemaphoreKeys::for_name(name)?;
        let added = self
            .store
            .execute_one(StoreCommand::sorted_add(
                keys.holders.as_str(),
                token.as_str(),
                unix_millis_now(),
            ))
            .await?
            .into_integer()?;

        if added > 0 {
            warn!(semaphore = name, "fair semaphore holder expired before refresh");
            self.release_fair(name, token).await?;
            return Ok(false);
        }

        Ok(true)
    }

    /// Fair acquire serialized behind a short lease lock on `name`.
    ///
    /// For stores that cannot run the acquire batches without interleaving.
    /// Returns `None` both when the lock is busy and when the semaphore is
    /// full. A slot taken while the lock release fails is given back before
    /// the error is returned.
    pub async fn acquire_fair_guarded(
        &self,
        name: &str,
        limit: u32,
        timeout: Duration,
    ) -> AppResult<Option<HolderToken>> {
        let Some(lock_token) = self
            .locks
            .acquire_with_timeout(
                name,
                self.config.guarded_semaphore_lock_timeout,
                self.config.guarded_semaphore_lock_lease,
            )
            .await?
        else {
            debug!(semaphore = name, "semaphore lock busy");
            return Ok(None);
        };

        let acquired = self.acquire_fair(name, limit, timeout).await;
        match self.locks.release(name, &lock_token).await {
            Ok(released) => {
                if !released {
                    warn!(semaphore = name, "semaphore lock lease expired while acquiring");
                }
                acquired
            }
            Err(error) => {
                if let Ok(Some(token)) = &acquired
                    && let Err(release_error) = self.release_fair(name, token).await
                {
                    warn!(
                        semaphore = name,
                        error = %release_error,
                        "failed to give back fair slot after lock release error"
                    );
                }
                Err(error)
            }
        }
    }
}
