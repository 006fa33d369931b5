//! Store port shared by every coordination service.

mod command;
mod reply;
mod store;

pub use command::{ScoreBound, StoreCommand};
pub use reply::{KeyTtl, ScoredMember, StoreReply, next_reply};
pub use store::{CoordinationStore, StoreTransaction};
