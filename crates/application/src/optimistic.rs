//! Watch-then-commit retry loop.

use std::time::{Duration, Instant};

use stead_core::{AppError, AppResult};
use tracing::debug;

use crate::coordination_ports::{CoordinationStore, StoreCommand, StoreReply, StoreTransaction};

/// Decision taken after reading watched state.
#[derive(Debug)]
pub enum OptimisticPlan<T> {
    /// Apply the writes atomically and yield `outcome` if nothing changed.
    Commit {
        /// Writes applied only when the watched keys are untouched.
        commands: Vec<StoreCommand>,
        /// Value returned once the commit lands.
        outcome: T,
    },
    /// Release the watch without writing and yield the value.
    Abandon(T),
}

/// Runs `plan` inside an optimistic transaction until it commits or abandons.
///
/// Each attempt watches `watch_keys`, issues `reads` and hands their replies
/// to `plan`. Commits rejected because a watched key changed are retried with
/// fresh reads; once `max_wait` has elapsed the loop gives up with
/// [`AppError::Conflict`].
pub async fn run_optimistic<T, F>(
    store: &dyn CoordinationStore,
    watch_keys: &[String],
    reads: &[StoreCommand],
    max_wait: Duration,
    mut plan: F,
) -> AppResult<T>
where
    T: Send,
    F: FnMut(Vec<StoreReply>) -> AppResult<OptimisticPlan<T>> + Send,
{
    let started_at = Instant::now();
    let mut attempts = 0_u32;

    loop {
        attempts = attempts.saturating_add(1);
        let mut transaction = store.watch(watch_keys).await?;

        let replies = match read_all(transaction.as_mut(), reads).await {
            Ok(replies) => replies,
            Err(error) => {
                transaction.abandon().await?;
                return Err(error);
            }
        };

        let step = match plan(replies) {
            Ok(step) => step,
            Err(error) => {
                transaction.abandon().await?;
                return Err(error);
            }
        };

        match step {
            OptimisticPlan::Abandon(outcome) => {
                transaction.abandon().await?;
                return Ok(outcome);
            }
            OptimisticPlan::Commit { commands, outcome } => {
                if transaction.commit(commands).await?.is_some() {
                    return Ok(outcome);
                }
            }
        }

        if started_at.elapsed() >= max_wait {
            return Err(AppError::Conflict(format!(
                "transaction watching {watch_keys:?} did not commit after {attempts} attempts"
            )));
        }

        debug!(attempts, keys = ?watch_keys, "watched keys changed, retrying transaction");
    }
}

async fn read_all(
    transaction: &mut dyn StoreTransaction,
    reads: &[StoreCommand],
) -> AppResult<Vec<StoreReply>> {
    let mut replies = Vec::with_capacity(reads.len());
    for read in reads {
        replies.push(transaction.read(read.clone()).await?);
    }

    Ok(replies)
}
