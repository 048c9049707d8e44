//! Durable job queue.
//!
//! The queue carries *delivery tickets*, not job state: a ticket names a
//! job whose authoritative record lives in the registry. Delivery is
//! at-least-once; exactly-one execution comes from the registry's
//! conditional `Queued -> Running` claim, so a duplicate delivery is a
//! benign no-op for the loser.
//!
//! Backends: Redis Streams with a consumer group (production) and an
//! in-memory queue with identical semantics (tests, single-process runs).

pub mod error;
pub mod memory;
pub mod message;
pub mod queue;
pub mod redis_queue;

pub use error::{QueueError, QueueResult};
pub use memory::MemoryQueue;
pub use message::QueueMessage;
pub use queue::{queue_from_env, Queue};
pub use redis_queue::{RedisQueue, RedisQueueConfig};
