use std::time::Duration;

use async_trait::async_trait;
use stead_core::{AppError, AppResult};

use super::command::StoreCommand;
use super::reply::StoreReply;

/// Shared key-value store holding all coordination state.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Executes a batch atomically and returns one reply per command.
    async fn execute(&self, commands: Vec<StoreCommand>) -> AppResult<Vec<StoreReply>>;

    /// Starts an optimistic transaction watching `keys`.
    async fn watch(&self, keys: &[String]) -> AppResult<Box<dyn StoreTransaction>>;

    /// Pops the head of the first non-empty list among `keys`, waiting up to
    /// `timeout` for an item to arrive. Returns the list key and the item.
    async fn blocking_pop_front(
        &self,
        keys: &[String],
        timeout: Duration,
    ) -> AppResult<Option<(String, String)>>;

    /// Executes a single command.
    async fn execute_one(&self, command: StoreCommand) -> AppResult<StoreReply> {
        self.execute(vec![command])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Internal("store returned no reply".to_owned()))
    }
}

/// Watch-then-commit session opened by [`CoordinationStore::watch`].
#[async_trait]
pub trait StoreTransaction: Send {
    /// Executes a read while the watch is active.
    async fn read(&mut self, command: StoreCommand) -> AppResult<StoreReply>;

    /// Commits `commands` atomically unless a watched key changed since the
    /// watch began, in which case nothing is applied and `None` is returned.
    async fn commit(self: Box<Self>, commands: Vec<StoreCommand>)
    -> AppResult<Option<Vec<StoreReply>>>;

    /// Drops the watch without writing.
    async fn abandon(self: Box<Self>) -> AppResult<()>;
}
