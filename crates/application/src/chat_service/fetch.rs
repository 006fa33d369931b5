use stead_core::AppResult;
use stead_domain::{ChannelId, ChannelMessages, ChatMessage};
use tracing::debug;

use crate::coordination_ports::{ScoreBound, StoreCommand, next_reply};

use super::{ChatService, log_key, roster_key, seen_key, validate_user};

impl ChatService {
    /// Returns every message `recipient` has not fetched yet, per channel.
    ///
    /// Fetching advances the recipient's cursor in each channel and deletes
    /// messages that every remaining member has now seen. Channels without
    /// new messages are left out.
    pub async fn fetch_pending(&self, recipient: &str) -> AppResult<Vec<ChannelMessages>> {
        validate_user(recipient)?;
        let seen = self
            .store
            .execute_one(StoreCommand::sorted_range_by_rank(seen_key(recipient), 0, -1))
            .await?
            .into_members()?;
        if seen.is_empty() {
            return Ok(Vec::new());
        }

        let mut channels = Vec::with_capacity(seen.len());
        let mut ranges = Vec::with_capacity(seen.len());
        for entry in &seen {
            let channel_id = ChannelId::parse(entry.member.as_str())?;
            ranges.push(StoreCommand::sorted_range_by_score(
                log_key(channel_id),
                ScoreBound::Exclusive(entry.score),
                ScoreBound::PositiveInfinity,
            ));
            channels.push(channel_id);
        }
        let ranges = self.store.execute(ranges).await?;

        let mut fetched = Vec::new();
        for (channel_id, range) in channels.into_iter().zip(ranges) {
            let messages = range
                .into_members()?
                .iter()
                .map(|entry| ChatMessage::decode(entry.member.as_str()))
                .collect::<AppResult<Vec<_>>>()?;
            let Some(last_seen) = messages.last().map(|message| message.id) else {
                continue;
            };

            self.acknowledge(channel_id, recipient, last_seen).await?;
            fetched.push(ChannelMessages {
                channel_id,
                messages,
            });
        }

        Ok(fetched)
    }

    async fn acknowledge(
        &self,
        channel_id: ChannelId,
        recipient: &str,
        last_seen: u64,
    ) -> AppResult<()> {
        let cursor = last_seen as f64;
        let replies = self
            .store
            .execute(vec![
                StoreCommand::sorted_add_existing(roster_key(channel_id), recipient, cursor),
                StoreCommand::sorted_range_by_rank(roster_key(channel_id), 0, 0),
            ])
            .await?;

        let mut replies = replies.into_iter();
        next_reply(&mut replies)?;
        let oldest_cursor = next_reply(&mut replies)?
            .into_members()?
            .first()
            .map(|entry| entry.score);

        let mut commands = vec![StoreCommand::sorted_add_existing(
            seen_key(recipient),
            channel_id.to_string(),
            cursor,
        )];
        if let Some(oldest_cursor) = oldest_cursor {
            commands.push(StoreCommand::sorted_remove_range_by_score(
                log_key(channel_id),
                ScoreBound::NegativeInfinity,
                ScoreBound::Inclusive(oldest_cursor),
            ));
        }
        self.store.execute(commands).await?;

        debug!(
            channel_id = %channel_id,
            recipient,
            last_seen,
            ?oldest_cursor,
            "messages acknowledged"
        );
        Ok(())
    }
}
