//! Store adapters for the coordination services.

#![forbid(unsafe_code)]

mod in_memory_coordination_store;
mod redis_coordination_store;

pub use in_memory_coordination_store::InMemoryCoordinationStore;
pub use redis_coordination_store::RedisCoordinationStore;
