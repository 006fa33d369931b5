use std::time::Duration;

use stead_core::{AppResult, HolderToken};
use tracing::debug;

use crate::clock::{duration_millis, unix_millis_now};
use crate::coordination_ports::{ScoreBound, StoreCommand, next_reply};

use super::{SemaphoreKeys, SemaphoreService, admitted, validate_acquire};

impl SemaphoreService {
    /// Tries to take one of `limit` slots of semaphore `name`.
    ///
    /// Holders older than `timeout` are pruned, the new holder is stamped and
    /// its rank read back, all in one atomic batch. Returns `None` when the
    /// rank is not below `limit`.
    pub async fn acquire(
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
                StoreCommand::sorted_add(keys.holders.as_str(), token.as_str(), now),
                StoreCommand::sorted_rank(keys.holders.as_str(), token.as_str()),
            ])
            .await?;

        let mut replies = replies.into_iter();
        let pruned = next_reply(&mut replies)?.into_integer()?;
        next_reply(&mut replies)?;
        let rank = next_reply(&mut replies)?.into_optional_integer()?;

        if admitted(rank, limit) {
            debug!(semaphore = name, pruned, ?rank, "semaphore acquired");
            return Ok(Some(token));
        }

        self.store
            .execute_one(StoreCommand::sorted_remove(
                keys.holders.as_str(),
                token.as_str(),
            ))
            .await?;
        debug!(semaphore = name, limit, "semaphore full");
        Ok(None)
    }

    /// Gives back the slot held by `token`.
    ///
    /// Returns `false` when the holder had already timed out or been released.
    pub async fn release(&self, name: &str, token: &HolderToken) -> AppResult<bool> {
        let keys = SemaphoreKeys::for_name(name)?;
        let removed = self
            .store
            .execute_one(StoreCommand::sorted_remove(
                keys.holders.as_str(),
                token.as_str(),
            ))
            .await?
            .into_integer()?;

        Ok(removed > 0)
    }

    /// Re-stamps the slot held by `token` so it does not time out.
    ///
    /// A holder that was already pruned is not re-added; `false` is returned
    /// and the caller must acquire again.
    pub async fn refresh(&self, name: &str, token: &HolderToken) -> AppResult<bool> {
        let keys = SemaphoreKeys::for_name(name)?;
        let replies = self
            .store
            .execute(vec![
                StoreCommand::sorted_score(keys.holders.as_str(), token.as_str()),
                StoreCommand::sorted_add_existing(
                    keys.holders.as_str(),
                    token.as_str(),
                    unix_millis_now(),
                ),
            ])
            .await?;

        let held = next_reply(&mut replies.into_iter())?
            .into_optional_score()?
            .is_some();
        Ok(held)
    }
}
