//! Coordination services and the store port they run on.

#![forbid(unsafe_code)]

mod chat_service;
mod clock;
mod coordination_config;
mod coordination_ports;
mod delayed_task_service;
mod lock_service;
mod optimistic;
mod semaphore_service;
mod task_worker;

pub use chat_service::ChatService;
pub use coordination_config::CoordinationConfig;
pub use coordination_ports::{
    CoordinationStore, KeyTtl, ScoreBound, ScoredMember, StoreCommand, StoreReply,
    StoreTransaction, next_reply,
};
pub use delayed_task_service::{
    DELAYED_TASKS_KEY, DelayedTaskService, PollOutcome, WITHDRAWN_TASKS_KEY, ready_queue_key,
};
pub use lock_service::{LockService, lock_key};
pub use optimistic::{OptimisticPlan, run_optimistic};
pub use semaphore_service::SemaphoreService;
pub use task_worker::{TaskHandler, TaskWorker, WorkOutcome};
