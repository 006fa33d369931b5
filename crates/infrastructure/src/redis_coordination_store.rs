//! Redis-backed coordination store.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Script, Value};
use stead_application::{CoordinationStore, StoreCommand, StoreReply, StoreTransaction};
use stead_core::{AppError, AppResult};

mod commands;
mod transaction;

use commands::{build_command, decode_replies};
use transaction::RedisStoreTransaction;

const POP_FIRST_SCRIPT: &str = r#"
for _, key in ipairs(KEYS) do
  local item = redis.call('LPOP', key)
  if item then
    return {key, item}
  end
end
return false
"#;

const POP_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Redis implementation of the coordination store.
///
/// Every key is namespaced under `key_prefix`.
#[derive(Clone)]
pub struct RedisCoordinationStore {
    client: redis::Client,
    key_prefix: String,
}

impl RedisCoordinationStore {
    /// Creates one store adapter.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, key: &str) -> String {
        format!("{}:{key}", self.key_prefix)
    }

    async fn connect(&self) -> AppResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Unavailable(format!("failed to connect to redis: {error}")))
    }

    async fn pop_first(
        &self,
        connection: &mut MultiplexedConnection,
        keys: &[String],
    ) -> AppResult<Option<(String, String)>> {
        let script = Script::new(POP_FIRST_SCRIPT);
        let mut invocation = script.prepare_invoke();
        for key in keys {
            invocation.key(self.key_for(key));
        }

        let popped: Option<(String, String)> = invocation
            .invoke_async(connection)
            .await
            .map_err(|error| AppError::Unavailable(format!("failed to pop ready item: {error}")))?;

        let prefix = format!("{}:", self.key_prefix);
        Ok(popped.map(|(key, item)| {
            let key = key.strip_prefix(prefix.as_str()).map_or(key.clone(), str::to_owned);
            (key, item)
        }))
    }
}

#[async_trait]
impl CoordinationStore for RedisCoordinationStore {
    async fn execute(&self, commands: Vec<StoreCommand>) -> AppResult<Vec<StoreReply>> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipeline = redis::pipe();
        pipeline.atomic();
        for command in &commands {
            pipeline.add_command(build_command(command, self.key_prefix.as_str()));
        }

        let mut connection = self.connect().await?;
        let values: Vec<Value> = pipeline
            .query_async(&mut connection)
            .await
            .map_err(|error| AppError::Unavailable(format!("failed to execute batch: {error}")))?;

        decode_replies(&commands, values)
    }

    async fn watch(&self, keys: &[String]) -> AppResult<Box<dyn StoreTransaction>> {
        let mut connection = self.connect().await?;

        let mut watch = redis::cmd("WATCH");
        for key in keys {
            watch.arg(self.key_for(key));
        }
        let () = watch
            .query_async(&mut connection)
            .await
            .map_err(|error| AppError::Unavailable(format!("failed to watch keys: {error}")))?;

        Ok(Box::new(RedisStoreTransaction {
            connection,
            key_prefix: self.key_prefix.clone(),
        }))
    }

    async fn blocking_pop_front(
        &self,
        keys: &[String],
        timeout: Duration,
    ) -> AppResult<Option<(String, String)>> {
        if keys.is_empty() {
            return Ok(None);
        }

        let deadline = Instant::now() + timeout;
        let mut connection = self.connect().await?;

        loop {
            if let Some(popped) = self.pop_first(&mut connection, keys).await? {
                return Ok(Some(popped));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            tokio::time::sleep(remaining.min(POP_POLL_INTERVAL)).await;
        }
    }
}
