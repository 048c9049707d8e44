//! In-memory queue backend.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::QueueResult;
use crate::message::QueueMessage;
use crate::queue::Queue;

#[derive(Default)]
struct Inner {
    live: VecDeque<(String, QueueMessage)>,
    scheduled: Vec<(Instant, QueueMessage)>,
    in_flight: HashMap<String, (Instant, QueueMessage)>,
    dlq: Vec<(QueueMessage, String)>,
    seen: HashSet<String>,
}

/// In-memory [`Queue`] with the same at-least-once semantics as the Redis
/// backend: unacked deliveries can be re-claimed after an idle period.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    inner: Arc<Mutex<Inner>>,
    tag_counter: Arc<AtomicU64>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_tag(&self) -> String {
        format!("mem-{}", self.tag_counter.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn init(&self) -> QueueResult<()> {
        Ok(())
    }

    async fn enqueue(&self, message: QueueMessage) -> QueueResult<()> {
        let tag = self.next_tag();
        let mut inner = self.inner.lock().await;
        if !inner.seen.insert(message.idempotency_key().to_string()) {
            debug!(job_id = %message.job_id, "duplicate ticket dropped");
            return Ok(());
        }
        inner.live.push_back((tag, message));
        Ok(())
    }

    async fn enqueue_delayed(&self, message: QueueMessage, delay: Duration) -> QueueResult<()> {
        let mut inner = self.inner.lock().await;
        inner.scheduled.push((Instant::now() + delay, message));
        Ok(())
    }

    async fn promote_scheduled(&self) -> QueueResult<usize> {
        let now = Instant::now();
        let due: Vec<QueueMessage> = {
            let mut inner = self.inner.lock().await;
            let (due, pending): (Vec<_>, Vec<_>) =
                inner.scheduled.drain(..).partition(|(at, _)| *at <= now);
            inner.scheduled = pending;
            due.into_iter().map(|(_, m)| m).collect()
        };

        let moved = due.len();
        for message in due {
            // Delayed successors carry fresh job ids, so dedup rarely bites
            self.enqueue(message).await?;
        }
        Ok(moved)
    }

    async fn consume(
        &self,
        _consumer: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, QueueMessage)>> {
        self.promote_scheduled().await?;

        let mut out = Vec::new();
        {
            let mut inner = self.inner.lock().await;
            while out.len() < count {
                match inner.live.pop_front() {
                    Some((tag, message)) => {
                        inner
                            .in_flight
                            .insert(tag.clone(), (Instant::now(), message.clone()));
                        out.push((tag, message));
                    }
                    None => break,
                }
            }
        }

        if out.is_empty() && block_ms > 0 {
            tokio::time::sleep(Duration::from_millis(block_ms.min(50))).await;
        }
        Ok(out)
    }

    async fn ack(&self, delivery_tag: &str, message: &QueueMessage) -> QueueResult<()> {
        let mut inner = self.inner.lock().await;
        inner.in_flight.remove(delivery_tag);
        inner.seen.remove(message.idempotency_key());
        Ok(())
    }

    async fn claim_stale(
        &self,
        _consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<(String, QueueMessage)>> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let stale_tags: Vec<String> = inner
            .in_flight
            .iter()
            .filter(|(_, (delivered, _))| now.duration_since(*delivered) >= min_idle)
            .map(|(tag, _)| tag.clone())
            .take(count)
            .collect();

        let mut claimed = Vec::new();
        for tag in stale_tags {
            if let Some((_, message)) = inner.in_flight.remove(&tag) {
                inner
                    .in_flight
                    .insert(tag.clone(), (now, message.clone()));
                claimed.push((tag, message));
            }
        }
        Ok(claimed)
    }

    async fn dead_letter(
        &self,
        delivery_tag: &str,
        message: &QueueMessage,
        error: &str,
    ) -> QueueResult<()> {
        let mut inner = self.inner.lock().await;
        inner.in_flight.remove(delivery_tag);
        inner.seen.remove(message.idempotency_key());
        inner.dlq.push((message.clone(), error.to_string()));
        Ok(())
    }

    async fn len(&self) -> QueueResult<u64> {
        Ok(self.inner.lock().await.live.len() as u64)
    }

    async fn dlq_len(&self) -> QueueResult<u64> {
        Ok(self.inner.lock().await.dlq.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storycut_models::{JobId, JobKind, MediaId};

    fn ticket(job: &str) -> QueueMessage {
        QueueMessage::new(JobId::from(job), MediaId::from("m1"), JobKind::Probe)
    }

    #[tokio::test]
    async fn enqueue_consume_ack_roundtrip() {
        let queue = MemoryQueue::new();
        queue.enqueue(ticket("j1")).await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 1);

        let delivered = queue.consume("w1", 0, 10).await.unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].1.job_id.as_str(), "j1");
        assert_eq!(queue.len().await.unwrap(), 0);

        queue.ack(&delivered[0].0, &delivered[0].1).await.unwrap();
        // After ack the same job id may be enqueued again
        queue.enqueue(ticket("j1")).await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_enqueue_is_dropped() {
        let queue = MemoryQueue::new();
        queue.enqueue(ticket("j1")).await.unwrap();
        queue.enqueue(ticket("j1")).await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delayed_tickets_become_visible_when_due() {
        let queue = MemoryQueue::new();
        queue
            .enqueue_delayed(ticket("j1"), Duration::from_millis(30))
            .await
            .unwrap();

        assert!(queue.consume("w1", 0, 10).await.unwrap().is_empty());
        tokio::time::sleep(Duration::from_millis(40)).await;
        let delivered = queue.consume("w1", 0, 10).await.unwrap();
        assert_eq!(delivered.len(), 1);
    }

    #[tokio::test]
    async fn unacked_delivery_can_be_claimed() {
        let queue = MemoryQueue::new();
        queue.enqueue(ticket("j1")).await.unwrap();

        let first = queue.consume("w1", 0, 10).await.unwrap();
        assert_eq!(first.len(), 1);

        // Crashed worker: nothing acked, another consumer claims it
        tokio::time::sleep(Duration::from_millis(20)).await;
        let claimed = queue
            .claim_stale("w2", Duration::from_millis(10), 10)
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].1.job_id.as_str(), "j1");
    }

    #[tokio::test]
    async fn dead_letter_parks_the_ticket() {
        let queue = MemoryQueue::new();
        queue.enqueue(ticket("j1")).await.unwrap();
        let delivered = queue.consume("w1", 0, 10).await.unwrap();

        queue
            .dead_letter(&delivered[0].0, &delivered[0].1, "exhausted retries")
            .await
            .unwrap();
        assert_eq!(queue.dlq_len().await.unwrap(), 1);
        assert_eq!(queue.len().await.unwrap(), 0);
    }
}
