//! Queue fabric
//!
//! Named FIFO queues over a durable append-only list, with per-queue put and
//! close subscribers. The dispatcher produces run frames into these queues;
//! subscriber gateways consume them, live or replayed.

pub mod backend;
pub mod manager;
#[allow(clippy::module_inception)]
pub mod queue;

pub use backend::{ListBackend, MemoryBackend, RedisBackend};
pub use manager::QueueManager;
pub use queue::{PutEvent, Queue, SubscriptionId};

/// Queue fabric errors
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue {0} not found")]
    NotFound(String),

    #[error("queue {0} already exists")]
    AlreadyExist(String),

    #[error("queue is not valid: {0}")]
    NotValid(String),

    #[error("failed to encode queue item: {0}")]
    Encode(String),

    #[error("queue backend error: {0}")]
    Backend(String),
}
