use async_trait::async_trait;
use redis::Value;
use redis::aio::MultiplexedConnection;
use stead_application::{StoreCommand, StoreReply, StoreTransaction};
use stead_core::{AppError, AppResult};

use super::commands::{build_command, decode_replies, decode_reply};

/// WATCH session pinned to its own connection.
pub(super) struct RedisStoreTransaction {
    pub(super) connection: MultiplexedConnection,
    pub(super) key_prefix: String,
}

#[async_trait]
impl StoreTransaction for RedisStoreTransaction {
    async fn read(&mut self, command: StoreCommand) -> AppResult<StoreReply> {
        let value: Value = build_command(&command, self.key_prefix.as_str())
            .query_async(&mut self.connection)
            .await
            .map_err(|error| {
                AppError::Unavailable(format!("failed to read watched key: {error}"))
            })?;

        decode_reply(&command, value)
    }

    async fn commit(
        mut self: Box<Self>,
        commands: Vec<StoreCommand>,
    ) -> AppResult<Option<Vec<StoreReply>>> {
        if commands.is_empty() {
            self.abandon_watch().await?;
            return Ok(Some(Vec::new()));
        }

        let mut pipeline = redis::pipe();
        pipeline.atomic();
        for command in &commands {
            pipeline.add_command(build_command(command, self.key_prefix.as_str()));
        }

        let values: Option<Vec<Value>> = pipeline
            .query_async(&mut self.connection)
            .await
            .map_err(|error| {
                AppError::Unavailable(format!("failed to commit transaction: {error}"))
            })?;

        match values {
            Some(values) => decode_replies(&commands, values).map(Some),
            None => Ok(None),
        }
    }

    async fn abandon(mut self: Box<Self>) -> AppResult<()> {
        self.abandon_watch().await
    }
}

impl RedisStoreTransaction {
    async fn abandon_watch(&mut self) -> AppResult<()> {
        let () = redis::cmd("UNWATCH")
            .query_async(&mut self.connection)
            .await
            .map_err(|error| AppError::Unavailable(format!("failed to unwatch: {error}")))?;
        Ok(())
    }
}
