use stead_core::{AppError, AppResult};
use stead_domain::{ChannelId, ChannelMember};
use tracing::info;

use crate::coordination_ports::{ScoreBound, StoreCommand, next_reply};

use super::{ChatService, log_key, roster_key, seen_key, sequence_key, validate_user};

impl ChatService {
    /// Adds `user` to the channel, starting at the newest message.
    pub async fn join(&self, channel_id: ChannelId, user: &str) -> AppResult<()> {
        validate_user(user)?;
        let current = self
            .store
            .execute_one(StoreCommand::get(sequence_key(channel_id)))
            .await?
            .into_optional_text()?
            .ok_or_else(|| AppError::NotFound(format!("chat channel {channel_id}")))?;
        let cursor = current.parse::<u64>().map_err(|error| {
            AppError::Internal(format!(
                "invalid sequence counter '{current}' for channel {channel_id}: {error}"
            ))
        })? as f64;

        self.store
            .execute(vec![
                StoreCommand::sorted_add(roster_key(channel_id), user, cursor),
                StoreCommand::sorted_add(seen_key(user), channel_id.to_string(), cursor),
            ])
            .await?;

        info!(channel_id = %channel_id, user, "member joined chat channel");
        Ok(())
    }

    /// Removes `user` from the channel.
    ///
    /// The last member leaving deletes the message log and sequence counter;
    /// otherwise messages every remaining member has seen are collected.
    /// Returns `false` when `user` was not a member.
    pub async fn leave(&self, channel_id: ChannelId, user: &str) -> AppResult<bool> {
        validate_user(user)?;
        let replies = self
            .store
            .execute(vec![
                StoreCommand::sorted_remove(roster_key(channel_id), user),
                StoreCommand::sorted_remove(seen_key(user), channel_id.to_string()),
                StoreCommand::sorted_count(roster_key(channel_id)),
            ])
            .await?;

        let mut replies = replies.into_iter();
        let was_member = next_reply(&mut replies)?.into_integer()? > 0;
        next_reply(&mut replies)?;
        let remaining = next_reply(&mut replies)?.into_integer()?;

        if remaining == 0 {
            self.store
                .execute(vec![
                    StoreCommand::delete(log_key(channel_id)),
                    StoreCommand::delete(sequence_key(channel_id)),
                ])
                .await?;
            info!(channel_id = %channel_id, "last member left, chat channel deleted");
            return Ok(was_member);
        }

        let oldest = self
            .store
            .execute_one(StoreCommand::sorted_range_by_rank(roster_key(channel_id), 0, 0))
            .await?
            .into_members()?;
        if let Some(oldest) = oldest.first() {
            self.store
                .execute_one(StoreCommand::sorted_remove_range_by_score(
                    log_key(channel_id),
                    ScoreBound::NegativeInfinity,
                    ScoreBound::Inclusive(oldest.score),
                ))
                .await?;
        }

        info!(channel_id = %channel_id, user, remaining, "member left chat channel");
        Ok(was_member)
    }

    /// Lists the roster with each member's cursor, lowest cursor first.
    pub async fn members(&self, channel_id: ChannelId) -> AppResult<Vec<ChannelMember>> {
        let roster = self
            .store
            .execute_one(StoreCommand::sorted_range_by_rank(roster_key(channel_id), 0, -1))
            .await?
            .into_members()?;

        Ok(roster
            .into_iter()
            .map(|entry| ChannelMember {
                user: entry.member,
                last_seen: entry.score as u64,
            })
            .collect())
    }

    /// Number of messages still retained in the channel log.
    pub async fn retained_message_count(&self, channel_id: ChannelId) -> AppResult<u64> {
        let count = self
            .store
            .execute_one(StoreCommand::sorted_count(log_key(channel_id)))
            .await?
            .into_integer()?;

        Ok(count.unsigned_abs())
    }
}
