//! The queue trait and backend selection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::QueueResult;
use crate::memory::MemoryQueue;
use crate::message::QueueMessage;
use crate::redis_queue::{RedisQueue, RedisQueueConfig};

/// At-least-once delivery of job tickets.
#[async_trait]
pub trait Queue: Send + Sync + 'static {
    /// Initialise backend state (consumer groups and the like).
    async fn init(&self) -> QueueResult<()>;

    /// Enqueue a ticket. Duplicate enqueues of the same job id are dropped.
    async fn enqueue(&self, message: QueueMessage) -> QueueResult<()>;

    /// Enqueue a ticket that only becomes visible after `delay`. Used for
    /// retry backoff and unmet-precondition re-enqueues.
    async fn enqueue_delayed(&self, message: QueueMessage, delay: Duration) -> QueueResult<()>;

    /// Move due delayed tickets into the live queue. Called periodically by
    /// the executor; returns how many moved.
    async fn promote_scheduled(&self) -> QueueResult<usize>;

    /// Pull up to `count` tickets, blocking up to `block_ms` when empty.
    /// Returns `(delivery_tag, message)` pairs; each must be acked.
    async fn consume(
        &self,
        consumer: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, QueueMessage)>>;

    /// Acknowledge a delivery (the ticket is done, not necessarily the
    /// job). Clears the enqueue dedup entry so the job id can be ticketed
    /// again, e.g. after an unmet-precondition requeue.
    async fn ack(&self, delivery_tag: &str, message: &QueueMessage) -> QueueResult<()>;

    /// Re-deliver tickets whose consumer went quiet (crash recovery).
    async fn claim_stale(
        &self,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<(String, QueueMessage)>>;

    /// Park a ticket on the dead-letter stream.
    async fn dead_letter(
        &self,
        delivery_tag: &str,
        message: &QueueMessage,
        error: &str,
    ) -> QueueResult<()>;

    /// Live queue length.
    async fn len(&self) -> QueueResult<u64>;

    /// Dead-letter stream length.
    async fn dlq_len(&self) -> QueueResult<u64>;
}

/// Pick a backend from the environment: Redis when `REDIS_URL` is set, the
/// in-memory queue otherwise.
pub fn queue_from_env() -> QueueResult<Arc<dyn Queue>> {
    if std::env::var("REDIS_URL").is_ok() {
        Ok(Arc::new(RedisQueue::new(RedisQueueConfig::from_env())?))
    } else {
        Ok(Arc::new(MemoryQueue::new()))
    }
}
