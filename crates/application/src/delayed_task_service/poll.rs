use stead_core::AppResult;
use stead_domain::ScheduledTask;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::unix_millis_now;
use crate::coordination_ports::{StoreCommand, next_reply};
use crate::optimistic::{OptimisticPlan, run_optimistic};

use super::{DELAYED_TASKS_KEY, DelayedTaskService, WITHDRAWN_TASKS_KEY, ready_queue_key};

/// Result of one poll pass over the delayed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing is due yet.
    Idle,
    /// The head payload could not be decoded and was removed.
    Discarded,
    /// The head task had been withdrawn and was dropped.
    Withdrawn,
    /// Another poller holds the task lock.
    Contended,
    /// The head task was moved to its ready list.
    Promoted,
    /// Another poller moved the task first.
    AlreadyPromoted,
}

impl DelayedTaskService {
    /// Examines the earliest delayed task once and promotes it if it is due.
    pub async fn poll_once(&self) -> AppResult<PollOutcome> {
        let head = self
            .store
            .execute_one(StoreCommand::sorted_range_by_rank(DELAYED_TASKS_KEY, 0, 0))
            .await?
            .into_members()?;

        let Some(head) = head.into_iter().next() else {
            return Ok(PollOutcome::Idle);
        };
        if head.score > unix_millis_now() {
            return Ok(PollOutcome::Idle);
        }

        let task = match ScheduledTask::decode(head.member.as_str()) {
            Ok(task) => task,
            Err(error) => {
                warn!(error = %error, "dropping undecodable delayed task");
                self.store
                    .execute_one(StoreCommand::sorted_remove(
                        DELAYED_TASKS_KEY,
                        head.member.as_str(),
                    ))
                    .await?;
                return Ok(PollOutcome::Discarded);
            }
        };

        let intended_delay = self
            .store
            .execute_one(StoreCommand::sorted_score(
                WITHDRAWN_TASKS_KEY,
                task.id().as_str(),
            ))
            .await?
            .into_optional_score()?;
        if is_withdrawn(intended_delay) {
            self.store
                .execute(vec![
                    StoreCommand::sorted_remove(DELAYED_TASKS_KEY, head.member.as_str()),
                    StoreCommand::sorted_remove(WITHDRAWN_TASKS_KEY, task.id().as_str()),
                ])
                .await?;
            info!(task_id = %task.id(), "withdrawn task dropped");
            return Ok(PollOutcome::Withdrawn);
        }

        let lock_name = task.id().as_str();
        let Some(lock_token) = self
            .locks
            .acquire_with_timeout(
                lock_name,
                self.config.promotion_lock_timeout,
                self.config.promotion_lock_lease,
            )
            .await?
        else {
            debug!(task_id = %task.id(), "task lock held by another poller");
            return Ok(PollOutcome::Contended);
        };

        let promoted = self.promote(head.member.as_str(), &task).await;
        let released = self.locks.release(lock_name, &lock_token).await;
        let outcome = promoted?;
        if !released? {
            warn!(task_id = %task.id(), "task lock lease expired during promotion");
        }

        if outcome == PollOutcome::Promoted {
            info!(
                task_id = %task.id(),
                queue = %task.queue(),
                name = %task.name(),
                "delayed task ready"
            );
        }
        Ok(outcome)
    }

    /// Polls until `cancel` fires, sleeping whenever nothing is due.
    ///
    /// Store failures abandon the current pass and are retried on the next
    /// one; the task stays delayed until a promotion commits.
    pub async fn run_poll_loop(&self, cancel: CancellationToken) {
        info!("delayed task poller started");

        while !cancel.is_cancelled() {
            let pause = match self.poll_once().await {
                Ok(PollOutcome::Idle | PollOutcome::Contended) => true,
                Ok(_) => false,
                Err(error) => {
                    warn!(error = %error, "delayed task poll failed");
                    true
                }
            };

            if pause {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = sleep(self.config.poll_interval) => {}
                }
            }
        }

        info!("delayed task poller stopped");
    }

    async fn promote(&self, payload: &str, task: &ScheduledTask) -> AppResult<PollOutcome> {
        let watch_keys = [DELAYED_TASKS_KEY.to_owned(), WITHDRAWN_TASKS_KEY.to_owned()];
        let ready_key = ready_queue_key(task.queue().as_str());
        let task_id = task.id().as_str();

        run_optimistic(
            self.store.as_ref(),
            &watch_keys,
            &[
                StoreCommand::sorted_score(DELAYED_TASKS_KEY, payload),
                StoreCommand::sorted_score(WITHDRAWN_TASKS_KEY, task_id),
            ],
            self.config.optimistic_retry_budget,
            |replies| {
                let mut replies = replies.into_iter();
                let still_delayed = next_reply(&mut replies)?.into_optional_score()?.is_some();
                let intended_delay = next_reply(&mut replies)?.into_optional_score()?;

                if !still_delayed {
                    return Ok(OptimisticPlan::Abandon(PollOutcome::AlreadyPromoted));
                }

                let mut commands = vec![
                    StoreCommand::sorted_remove(DELAYED_TASKS_KEY, payload),
                    StoreCommand::sorted_remove(WITHDRAWN_TASKS_KEY, task_id),
                ];
                if is_withdrawn(intended_delay) {
                    return Ok(OptimisticPlan::Commit {
                        commands,
                        outcome: PollOutcome::Withdrawn,
                    });
                }

                commands.push(StoreCommand::list_push(ready_key.as_str(), payload));
                Ok(OptimisticPlan::Commit {
                    commands,
                    outcome: PollOutcome::Promoted,
                })
            },
        )
        .await
    }
}

fn is_withdrawn(intended_delay: Option<f64>) -> bool {
    intended_delay.is_some_and(|delay| delay <= 0.0)
}
