use std::time::Duration;

use serde_json::Value;
use stead_core::{AppResult, HolderToken};
use stead_domain::ScheduledTask;
use tracing::debug;

use crate::clock::{duration_millis, unix_millis_now};
use crate::coordination_ports::{StoreCommand, next_reply};

use super::{DELAYED_TASKS_KEY, DelayedTaskService, WITHDRAWN_TASKS_KEY, ready_queue_key};

impl DelayedTaskService {
    /// Schedules task `name` on `queue` to become ready after `delay`.
    ///
    /// A delay that rounds to zero milliseconds appends the task to the ready
    /// list immediately. Returns the task identifier, usable with
    /// [`DelayedTaskService::cancel`].
    pub async fn schedule(
        &self,
        queue: &str,
        name: &str,
        args: Vec<Value>,
        delay: Duration,
    ) -> AppResult<HolderToken> {
        let task = ScheduledTask::new(queue, name, args)?;
        let payload = task.encode()?;

        let delay_millis = duration_millis(delay);
        if delay_millis <= 0.0 {
            self.store
                .execute_one(StoreCommand::list_push(ready_queue_key(queue), payload))
                .await?;
            debug!(task_id = %task.id(), queue, name, "task queued for immediate execution");
            return Ok(task.id().clone());
        }

        self.store
            .execute(vec![
                StoreCommand::sorted_add(
                    DELAYED_TASKS_KEY,
                    payload,
                    unix_millis_now() + delay_millis,
                ),
                StoreCommand::sorted_add(WITHDRAWN_TASKS_KEY, task.id().as_str(), delay_millis),
            ])
            .await?;

        debug!(
            task_id = %task.id(),
            queue,
            name,
            delay_ms = delay.as_millis(),
            "task delayed"
        );
        Ok(task.id().clone())
    }

    /// Withdraws a delayed task so that pollers drop it instead of running it.
    ///
    /// Returns `false` when the task is no longer delayed, either because it
    /// already reached its ready list or because it never was deferred.
    pub async fn cancel(&self, task_id: &HolderToken) -> AppResult<bool> {
        let replies = self
            .store
            .execute(vec![
                StoreCommand::sorted_score(WITHDRAWN_TASKS_KEY, task_id.as_str()),
                StoreCommand::sorted_add_existing(WITHDRAWN_TASKS_KEY, task_id.as_str(), 0.0),
            ])
            .await?;

        let withdrawn = next_reply(&mut replies.into_iter())?
            .into_optional_score()?
            .is_some();
        debug!(task_id = %task_id, withdrawn, "task withdrawal requested");
        Ok(withdrawn)
    }
}
