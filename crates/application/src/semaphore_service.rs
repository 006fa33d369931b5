//! Counting semaphores kept in sorted sets.
//!
//! Holders live in `semaphore:<name>` scored by acquisition time; entries
//! older than the caller's timeout are pruned lazily on the next acquire.
//! The fair variant adds `semaphore:<name>:owner`, scored by tickets drawn
//! from `semaphore:<name>:counter`, and ranks holders by ticket instead of
//! by clock.

mod counting;
mod fair;

use std::sync::Arc;
use std::time::Duration;

use stead_core::{AppError, AppResult};

use crate::coordination_config::CoordinationConfig;
use crate::coordination_ports::CoordinationStore;
use crate::lock_service::LockService;

/// Application service for plain and fair semaphores.
#[derive(Clone)]
pub struct SemaphoreService {
    store: Arc<dyn CoordinationStore>,
    locks: LockService,
    config: CoordinationConfig,
}

impl SemaphoreService {
    /// Creates a new semaphore service.
    #[must_use]
    pub fn new(store: Arc<dyn CoordinationStore>, config: CoordinationConfig) -> Self {
        Self {
            locks: LockService::new(Arc::clone(&store), config.clone()),
            store,
            config,
        }
    }
}

struct SemaphoreKeys {
    holders: String,
    owners: String,
    counter: String,
}

impl SemaphoreKeys {
    fn for_name(name: &str) -> AppResult<Self> {
        if name.trim().is_empty() {
            return Err(AppError::Validation(
                "semaphore name must not be empty".to_owned(),
            ));
        }

        Ok(Self {
            holders: format!("semaphore:{name}"),
            owners: format!("semaphore:{name}:owner"),
            counter: format!("semaphore:{name}:counter"),
        })
    }
}

fn validate_acquire(limit: u32, timeout: Duration) -> AppResult<()> {
    if limit == 0 {
        return Err(AppError::Validation(
            "semaphore limit must be greater than zero".to_owned(),
        ));
    }

    if timeout.is_zero() {
        return Err(AppError::Validation(
            "semaphore timeout must be greater than zero".to_owned(),
        ));
    }

    Ok(())
}

fn admitted(rank: Option<i64>, limit: u32) -> bool {
    rank.is_some_and(|rank| rank < i64::from(limit))
}
