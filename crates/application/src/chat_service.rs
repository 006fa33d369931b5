//! Multi-recipient chat channels with per-member read cursors.
//!
//! Per channel the store holds a sequence counter `ids:<chat>`, the message
//! log `msgs:<chat>` scored by sequence number and the roster `chat:<chat>`
//! scored by each member's last seen sequence number. Every member also has
//! `seen:<user>` mapping their channels to the same cursor, which is how
//! pending messages are found without scanning channels.

mod channel;
mod fetch;
mod membership;

use std::sync::Arc;

use stead_core::{AppError, AppResult};
use stead_domain::ChannelId;

use crate::coordination_config::CoordinationConfig;
use crate::coordination_ports::CoordinationStore;
use crate::lock_service::LockService;

const CHANNEL_IDS_KEY: &str = "ids:chat:";

/// Application service for chat channels.
#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn CoordinationStore>,
    locks: LockService,
    config: CoordinationConfig,
}

impl ChatService {
    /// Creates a new chat service.
    #[must_use]
    pub fn new(store: Arc<dyn CoordinationStore>, config: CoordinationConfig) -> Self {
        Self {
            locks: LockService::new(Arc::clone(&store), config.clone()),
            store,
            config,
        }
    }
}

fn roster_key(channel_id: ChannelId) -> String {
    format!("chat:{channel_id}")
}

fn log_key(channel_id: ChannelId) -> String {
    format!("msgs:{channel_id}")
}

fn sequence_key(channel_id: ChannelId) -> String {
    format!("ids:{channel_id}")
}

fn seen_key(user: &str) -> String {
    format!("seen:{user}")
}

fn validate_user(user: &str) -> AppResult<()> {
    if user.trim().is_empty() {
        return Err(AppError::Validation(
            "chat member name must not be empty".to_owned(),
        ));
    }

    Ok(())
}

fn sequence_number(value: i64) -> AppResult<u64> {
    u64::try_from(value).map_err(|error| {
        AppError::Internal(format!("invalid chat sequence number {value}: {error}"))
    })
}
