use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use stead_application::{CoordinationStore, StoreCommand, StoreReply, StoreTransaction};
use stead_core::AppResult;

mod keyspace;

use keyspace::Keyspace;

const POP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// In-memory coordination store for tests and single-process deployments.
///
/// Batches run under one lock, so every batch is atomic. Watches compare
/// per-key versions at commit time.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCoordinationStore {
    keyspace: Arc<Mutex<Keyspace>>,
}

impl InMemoryCoordinationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn execute(&self, commands: Vec<StoreCommand>) -> AppResult<Vec<StoreReply>> {
        let now = Instant::now();
        let mut keyspace = self.keyspace.lock().await;
        commands
            .iter()
            .map(|command| keyspace.apply(command, now))
            .collect()
    }

    async fn watch(&self, keys: &[String]) -> AppResult<Box<dyn StoreTransaction>> {
        let now = Instant::now();
        let mut keyspace = self.keyspace.lock().await;
        let watched = keys
            .iter()
            .map(|key| (key.clone(), keyspace.version(key, now)))
            .collect();

        Ok(Box::new(InMemoryStoreTransaction {
            keyspace: Arc::clone(&self.keyspace),
            watched,
        }))
    }

    async fn blocking_pop_front(
        &self,
        keys: &[String],
        timeout: Duration,
    ) -> AppResult<Option<(String, String)>> {
        let deadline = Instant::now() + timeout;

        loop {
            {
                let now = Instant::now();
                let mut keyspace = self.keyspace.lock().await;
                for key in keys {
                    if let StoreReply::Text(item) =
                        keyspace.apply(&StoreCommand::list_pop_front(key.as_str()), now)?
                    {
                        return Ok(Some((key.clone(), item)));
                    }
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            tokio::time::sleep(remaining.min(POP_POLL_INTERVAL)).await;
        }
    }
}

struct InMemoryStoreTransaction {
    keyspace: Arc<Mutex<Keyspace>>,
    watched: Vec<(String, u64)>,
}

#[async_trait]
impl StoreTransaction for InMemoryStoreTransaction {
    async fn read(&mut self, command: StoreCommand) -> AppResult<StoreReply> {
        let mut keyspace = self.keyspace.lock().await;
        keyspace.apply(&command, Instant::now())
    }

    async fn commit(
        self: Box<Self>,
        commands: Vec<StoreCommand>,
    ) -> AppResult<Option<Vec<StoreReply>>> {
        let now = Instant::now();
        let mut keyspace = self.keyspace.lock().await;

        for (key, version) in &self.watched {
            if keyspace.version(key, now) != *version {
                return Ok(None);
            }
        }

        commands
            .iter()
            .map(|command| keyspace.apply(command, now))
            .collect::<AppResult<Vec<_>>>()
            .map(Some)
    }

    async fn abandon(self: Box<Self>) -> AppResult<()> {
        Ok(())
    }
}
