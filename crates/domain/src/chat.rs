use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stead_core::{AppError, AppResult};

/// Numeric identifier of a chat channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(u64);

impl ChannelId {
    /// Wraps an allocated channel number.
    #[must_use]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Parses a channel id stored as a sorted-set member.
    pub fn parse(value: &str) -> AppResult<Self> {
        value.parse::<u64>().map(Self).map_err(|error| {
            AppError::Internal(format!("invalid stored channel id '{value}': {error}"))
        })
    }
}

impl Display for ChannelId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// One message in a channel log, keyed by its sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Channel-local sequence number, strictly increasing.
    pub id: u64,
    /// Time the sender appended the message.
    pub sent_at: DateTime<Utc>,
    /// Sending member.
    pub sender: String,
    /// Message body.
    pub message: String,
}

impl ChatMessage {
    /// Encodes the message as stored in the channel log.
    pub fn encode(&self) -> AppResult<String> {
        serde_json::to_string(self).map_err(|error| {
            AppError::Internal(format!("failed to encode chat message: {error}"))
        })
    }

    /// Decodes one stored message.
    pub fn decode(payload: &str) -> AppResult<Self> {
        serde_json::from_str(payload).map_err(|error| {
            AppError::Internal(format!("invalid chat message payload '{payload}': {error}"))
        })
    }
}

/// Messages fetched from one channel in sequence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessages {
    /// Channel the messages belong to.
    pub channel_id: ChannelId,
    /// New messages, oldest first.
    pub messages: Vec<ChatMessage>,
}

/// Roster entry of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMember {
    /// Member name.
    pub user: String,
    /// Highest sequence number the member has fetched.
    pub last_seen: u64,
}

#[cfg(test)]
mod tests {
    use super::ChannelId;

    #[test]
    fn channel_id_parses_stored_member() {
        let parsed = ChannelId::parse("42");
        assert!(parsed.is_ok());
        assert_eq!(parsed.unwrap_or_else(|_| unreachable!()).to_string(), "42");
    }

    #[test]
    fn channel_id_rejects_non_numeric_member() {
        assert!(ChannelId::parse("chat-1").is_err());
    }
}
