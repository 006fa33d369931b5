use chrono::Utc;
use stead_core::{AppError, AppResult};
use stead_domain::{ChannelId, ChatMessage};
use tracing::{debug, info, warn};

use crate::coordination_ports::StoreCommand;

use super::{
    CHANNEL_IDS_KEY, ChatService, log_key, roster_key, seen_key, sequence_key, sequence_number,
    validate_user,
};

impl ChatService {
    /// Opens a channel between `creator` and `members` and posts the first
    /// message from `creator`.
    pub async fn create_channel(
        &self,
        creator: &str,
        members: &[String],
        first_message: &str,
    ) -> AppResult<ChannelId> {
        validate_user(creator)?;
        let mut roster: Vec<&str> = Vec::with_capacity(members.len() + 1);
        for member in members {
            validate_user(member)?;
            if !roster.contains(&member.as_str()) {
                roster.push(member.as_str());
            }
        }
        if !roster.contains(&creator) {
            roster.push(creator);
        }

        let allocated = self
            .store
            .execute_one(StoreCommand::increment(CHANNEL_IDS_KEY))
            .await?
            .into_integer()?;
        let channel_id = ChannelId::new(sequence_number(allocated)?);

        let mut commands = Vec::with_capacity(roster.len() * 2);
        for member in &roster {
            commands.push(StoreCommand::sorted_add(roster_key(channel_id), *member, 0.0));
            commands.push(StoreCommand::sorted_add(
                seen_key(member),
                channel_id.to_string(),
                0.0,
            ));
        }
        self.store.execute(commands).await?;
        info!(channel_id = %channel_id, members = roster.len(), "chat channel created");

        self.send(channel_id, creator, first_message)
            .await?
            .ok_or_else(|| {
                AppError::Conflict(format!("channel {channel_id} lock busy on creation"))
            })
    }

    /// Appends a message from `sender` to the channel log.
    ///
    /// Sends are serialized by the channel lock so that sequence numbers and
    /// log order agree. Returns `None` when the lock could not be taken in
    /// time; the sender should retry. A sender missing from the roster, which
    /// includes every sender once the channel was deleted, is `NotFound`.
    pub async fn send(
        &self,
        channel_id: ChannelId,
        sender: &str,
        body: &str,
    ) -> AppResult<Option<ChannelId>> {
        validate_user(sender)?;
        let lock_name = roster_key(channel_id);

        let Some(lock_token) = self
            .locks
            .acquire_with_timeout(
                lock_name.as_str(),
                self.config.send_lock_timeout,
                self.config.send_lock_lease,
            )
            .await?
        else {
            debug!(channel_id = %channel_id, "channel lock busy");
            return Ok(None);
        };

        let appended = self.append_message(channel_id, sender, body).await;
        let released = self.locks.release(lock_name.as_str(), &lock_token).await;
        let message_id = appended?;
        if !released? {
            warn!(channel_id = %channel_id, "channel lock lease expired while sending");
        }

        debug!(channel_id = %channel_id, message_id, sender, "chat message sent");
        Ok(Some(channel_id))
    }

    async fn append_message(
        &self,
        channel_id: ChannelId,
        sender: &str,
        body: &str,
    ) -> AppResult<u64> {
        let membership = self
            .store
            .execute_one(StoreCommand::sorted_score(roster_key(channel_id), sender))
            .await?
            .into_optional_score()?;
        if membership.is_none() {
            return Err(AppError::NotFound(format!(
                "'{sender}' is not a member of chat channel {channel_id}"
            )));
        }

        let next = self
            .store
            .execute_one(StoreCommand::increment(sequence_key(channel_id)))
            .await?
            .into_integer()?;
        let message = ChatMessage {
            id: sequence_number(next)?,
            sent_at: Utc::now(),
            sender: sender.to_owned(),
            message: body.to_owned(),
        };

        self.store
            .execute_one(StoreCommand::sorted_add(
                log_key(channel_id),
                message.encode()?,
                message.id as f64,
            ))
            .await?;

        Ok(message.id)
    }
}
