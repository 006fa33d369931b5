//! Payload types persisted in the coordination store.

#![forbid(unsafe_code)]

mod chat;
mod task;

pub use chat::{ChannelId, ChannelMember, ChannelMessages, ChatMessage};
pub use task::ScheduledTask;
