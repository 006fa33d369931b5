use serde::{Deserialize, Serialize};
use serde_json::Value;
use stead_core::{AppError, AppResult, HolderToken, NonEmptyString};

/// One unit of work addressed to a named ready queue.
///
/// The encoded form is what the dispatcher moves between the delayed set and
/// the ready list, so it is produced once at scheduling time and then only
/// ever compared byte for byte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    id: HolderToken,
    queue: NonEmptyString,
    name: NonEmptyString,
    args: Vec<Value>,
}

impl ScheduledTask {
    /// Creates a task with a freshly generated identifier.
    pub fn new(
        queue: impl Into<String>,
        name: impl Into<String>,
        args: Vec<Value>,
    ) -> AppResult<Self> {
        let queue = NonEmptyString::new(queue)
            .map_err(|_| AppError::Validation("task queue must not be empty".to_owned()))?;
        let name = NonEmptyString::new(name)
            .map_err(|_| AppError::Validation("task name must not be empty".to_owned()))?;

        Ok(Self {
            id: HolderToken::generate(),
            queue,
            name,
            args,
        })
    }

    /// Returns the task identifier.
    #[must_use]
    pub fn id(&self) -> &HolderToken {
        &self.id
    }

    /// Returns the ready queue this task is destined for.
    #[must_use]
    pub fn queue(&self) -> &NonEmptyString {
        &self.queue
    }

    /// Returns the handler name.
    #[must_use]
    pub fn name(&self) -> &NonEmptyString {
        &self.name
    }

    /// Returns the handler arguments.
    #[must_use]
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Encodes the task as its stored payload.
    pub fn encode(&self) -> AppResult<String> {
        serde_json::to_string(self)
            .map_err(|error| AppError::Internal(format!("failed to encode task payload: {error}")))
    }

    /// Decodes a stored payload.
    pub fn decode(payload: &str) -> AppResult<Self> {
        serde_json::from_str(payload).map_err(|error| {
            AppError::Internal(format!("invalid task payload '{payload}': {error}"))
        })
    }
}
