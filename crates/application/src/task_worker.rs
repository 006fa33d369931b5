//! Ready-queue consumer dispatching tasks to named handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use stead_core::{AppError, AppResult, HolderToken};
use stead_domain::ScheduledTask;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::coordination_config::CoordinationConfig;
use crate::coordination_ports::{CoordinationStore, StoreCommand};
use crate::delayed_task_service::ready_queue_key;

/// Executes tasks of one name.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Runs one task popped from a ready list.
    async fn handle(&self, task: &ScheduledTask) -> AppResult<()>;
}

/// Result of popping one item from the ready lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkOutcome {
    /// No item arrived before the pop timeout.
    Empty,
    /// The popped payload could not be decoded.
    Discarded,
    /// No handler is registered for the task name.
    UnknownTask {
        /// Task identifier.
        task_id: HolderToken,
        /// Unregistered task name.
        name: String,
    },
    /// The handler returned an error.
    Failed {
        /// Task identifier.
        task_id: HolderToken,
        /// Handler error message.
        error: String,
    },
    /// The handler ran to completion.
    Completed {
        /// Task identifier.
        task_id: HolderToken,
    },
}

/// Worker popping ready tasks in queue priority order.
#[derive(Clone)]
pub struct TaskWorker {
    store: Arc<dyn CoordinationStore>,
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
    config: CoordinationConfig,
}

impl TaskWorker {
    /// Creates a worker without handlers.
    #[must_use]
    pub fn new(store: Arc<dyn CoordinationStore>, config: CoordinationConfig) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
            config,
        }
    }

    /// Registers the handler for tasks named `name`.
    pub fn with_handler(
        mut self,
        name: impl Into<String>,
        handler: Arc<dyn TaskHandler>,
    ) -> AppResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(AppError::Validation(
                "task handler name must not be empty".to_owned(),
            ));
        }

        self.handlers.insert(name, handler);
        Ok(self)
    }

    /// Pops and runs at most one task.
    ///
    /// Earlier queues in `queues` are drained before later ones.
    pub async fn process_next(&self, queues: &[String]) -> AppResult<WorkOutcome> {
        if queues.is_empty() {
            return Err(AppError::Validation(
                "task worker needs at least one queue".to_owned(),
            ));
        }

        let keys: Vec<String> = queues.iter().map(|queue| ready_queue_key(queue)).collect();
        let Some((queue_key, payload)) = self
            .store
            .blocking_pop_front(&keys, self.config.worker_pop_timeout)
            .await?
        else {
            return Ok(WorkOutcome::Empty);
        };

        let task = match ScheduledTask::decode(payload.as_str()) {
            Ok(task) => task,
            Err(error) => {
                warn!(queue = %queue_key, error = %error, "dropping undecodable ready task");
                return Ok(WorkOutcome::Discarded);
            }
        };

        let Some(handler) = self.handlers.get(task.name().as_str()) else {
            warn!(
                task_id = %task.id(),
                name = %task.name(),
                "no handler registered for task"
            );
            return Ok(WorkOutcome::UnknownTask {
                task_id: task.id().clone(),
                name: task.name().to_string(),
            });
        };

        match handler.handle(&task).await {
            Ok(()) => {
                debug!(task_id = %task.id(), name = %task.name(), "task completed");
                Ok(WorkOutcome::Completed {
                    task_id: task.id().clone(),
                })
            }
            Err(error) => {
                warn!(
                    task_id = %task.id(),
                    name = %task.name(),
                    error = %error,
                    "task handler failed"
                );
                Ok(WorkOutcome::Failed {
                    task_id: task.id().clone(),
                    error: error.to_string(),
                })
            }
        }
    }

    /// Number of tasks waiting across the ready lists of `queues`.
    pub async fn backlog(&self, queues: &[String]) -> AppResult<u64> {
        let lengths = self
            .store
            .execute(
                queues
                    .iter()
                    .map(|queue| StoreCommand::list_length(ready_queue_key(queue)))
                    .collect(),
            )
            .await?;

        lengths.into_iter().try_fold(0_u64, |total, length| {
            Ok(total + length.into_integer()?.unsigned_abs())
        })
    }

    /// Processes tasks until `cancel` fires.
    pub async fn run(&self, queues: &[String], cancel: CancellationToken) {
        info!(?queues, handlers = self.handlers.len(), "task worker started");

        while !cancel.is_cancelled() {
            if let Err(error) = self.process_next(queues).await {
                warn!(error = %error, "failed to pop ready task");
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = sleep(self.config.poll_interval) => {}
                }
            }
        }

        info!("task worker stopped");
    }
}
