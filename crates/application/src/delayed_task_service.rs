//! Deferred task scheduling.
//!
//! Tasks due now go straight to the ready list `queue:<queue>`. Deferred
//! tasks wait in the `delayed:` sorted set scored by due time, next to a
//! `delayed:withdrawn` record of their intended delay; a delay of zero marks
//! the task as withdrawn. Pollers move due tasks to their ready list under a
//! per-task lock.

mod poll;
mod schedule;

use std::sync::Arc;

use stead_core::AppResult;
use stead_domain::ScheduledTask;

use crate::coordination_config::CoordinationConfig;
use crate::coordination_ports::{CoordinationStore, StoreCommand};
use crate::lock_service::LockService;

pub use poll::PollOutcome;

/// Sorted set of delayed payloads scored by due time.
pub const DELAYED_TASKS_KEY: &str = "delayed:";

/// Sorted set of task ids scored by intended delay.
pub const WITHDRAWN_TASKS_KEY: &str = "delayed:withdrawn";

/// Returns the ready list key for `queue`.
#[must_use]
pub fn ready_queue_key(queue: &str) -> String {
    format!("queue:{queue}")
}

/// Application service scheduling and promoting deferred tasks.
#[derive(Clone)]
pub struct DelayedTaskService {
    store: Arc<dyn CoordinationStore>,
    locks: LockService,
    config: CoordinationConfig,
}

impl DelayedTaskService {
    /// Creates a new delayed task service.
    #[must_use]
    pub fn new(store: Arc<dyn CoordinationStore>, config: CoordinationConfig) -> Self {
        Self {
            locks: LockService::new(Arc::clone(&store), config.clone()),
            store,
            config,
        }
    }

    /// Lists tasks waiting in the ready list of `queue`, oldest first.
    pub async fn ready_tasks(&self, queue: &str) -> AppResult<Vec<ScheduledTask>> {
        self.store
            .execute_one(StoreCommand::list_range(ready_queue_key(queue), 0, -1))
            .await?
            .into_texts()?
            .iter()
            .map(|payload| ScheduledTask::decode(payload))
            .collect()
    }

    /// Number of tasks still waiting for their due time.
    pub async fn delayed_count(&self) -> AppResult<u64> {
        let count = self
            .store
            .execute_one(StoreCommand::sorted_count(DELAYED_TASKS_KEY))
            .await?
            .into_integer()?;

        Ok(count.unsigned_abs())
    }
}
