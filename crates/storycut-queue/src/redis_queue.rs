//! Redis Streams queue backend.
//!
//! One stream + consumer group for live tickets, a sorted set for delayed
//! tickets, a second stream as the dead-letter queue, and short-lived
//! `SETNX` keys for enqueue dedup. Unacked deliveries are recovered with
//! `XPENDING`/`XCLAIM`.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::message::QueueMessage;
use crate::queue::Queue;

/// Redis queue configuration.
#[derive(Debug, Clone)]
pub struct RedisQueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for live tickets
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter stream name
    pub dlq_stream_name: String,
    /// Sorted set holding delayed tickets
    pub scheduled_key: String,
    /// Dedup key TTL
    pub dedup_ttl: Duration,
}

impl Default for RedisQueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "storycut:jobs".to_string(),
            consumer_group: "storycut:workers".to_string(),
            dlq_stream_name: "storycut:dlq".to_string(),
            scheduled_key: "storycut:scheduled".to_string(),
            dedup_ttl: Duration::from_secs(3600),
        }
    }
}

impl RedisQueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or(defaults.stream_name),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM").unwrap_or(defaults.dlq_stream_name),
            scheduled_key: std::env::var("QUEUE_SCHEDULED_KEY").unwrap_or(defaults.scheduled_key),
            dedup_ttl: Duration::from_secs(
                std::env::var("QUEUE_DEDUP_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
        }
    }
}

/// Redis Streams [`Queue`] backend.
pub struct RedisQueue {
    client: redis::Client,
    config: RedisQueueConfig,
}

impl RedisQueue {
    pub fn new(config: RedisQueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> QueueResult<Self> {
        Self::new(RedisQueueConfig::from_env())
    }

    async fn conn(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    fn dedup_key(&self, message: &QueueMessage) -> String {
        format!("storycut:dedup:{}", message.idempotency_key())
    }

    /// XACK + XDEL without touching the dedup entry. Used for malformed
    /// payloads where no ticket could be parsed.
    async fn ack_raw(&self, delivery_tag: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(delivery_tag)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(delivery_tag)
            .query_async::<()>(&mut conn)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl Queue for RedisQueue {
    async fn init(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    async fn enqueue(&self, message: QueueMessage) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(&message)?;

        // SET NX with TTL drops duplicate enqueues of the same job
        let dedup_key = self.dedup_key(&message);
        let acquired: bool = redis::cmd("SET")
            .arg(&dedup_key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.config.dedup_ttl.as_secs())
            .query_async(&mut conn)
            .await
            .unwrap_or(false);
        if !acquired {
            warn!(job_id = %message.job_id, "duplicate ticket dropped");
            return Ok(());
        }

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("ticket")
            .arg(&payload)
            .query_async(&mut conn)
            .await?;

        debug!(job_id = %message.job_id, message_id = %message_id, "ticket enqueued");
        Ok(())
    }

    async fn enqueue_delayed(&self, message: QueueMessage, delay: Duration) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(&message)?;

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let visible_at = now + delay.as_secs();

        redis::cmd("ZADD")
            .arg(&self.config.scheduled_key)
            .arg(visible_at)
            .arg(&payload)
            .query_async::<()>(&mut conn)
            .await?;

        debug!(
            job_id = %message.job_id,
            delay_secs = delay.as_secs(),
            "ticket scheduled"
        );
        Ok(())
    }

    async fn promote_scheduled(&self) -> QueueResult<usize> {
        let mut conn = self.conn().await?;

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(&self.config.scheduled_key)
            .arg(0)
            .arg(now)
            .query_async(&mut conn)
            .await?;

        if due.is_empty() {
            return Ok(0);
        }

        let mut moved = 0;
        for payload in &due {
            match serde_json::from_str::<QueueMessage>(payload) {
                Ok(message) => {
                    self.enqueue(message).await?;
                    moved += 1;
                }
                Err(e) => {
                    warn!("failed to parse scheduled ticket: {}", e);
                }
            }
            redis::cmd("ZREM")
                .arg(&self.config.scheduled_key)
                .arg(payload)
                .query_async::<()>(&mut conn)
                .await
                .ok();
        }

        if moved > 0 {
            debug!(count = moved, "promoted scheduled tickets");
        }
        Ok(moved)
    }

    async fn consume(
        &self,
        consumer: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, QueueMessage)>> {
        let mut conn = self.conn().await?;

        let result: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let mut tickets = Vec::new();
        for stream_key in result.keys {
            for entry in stream_key.ids {
                let message_id = entry.id.clone();
                if let Some(redis::Value::BulkString(payload)) = entry.map.get("ticket") {
                    let payload_str = String::from_utf8_lossy(payload);
                    match serde_json::from_str::<QueueMessage>(&payload_str) {
                        Ok(message) => tickets.push((message_id, message)),
                        Err(e) => {
                            warn!("failed to parse ticket payload: {}", e);
                            // Ack malformed entries so they do not loop forever
                            self.ack_raw(&message_id).await.ok();
                        }
                    }
                }
            }
        }

        Ok(tickets)
    }

    async fn ack(&self, delivery_tag: &str, message: &QueueMessage) -> QueueResult<()> {
        self.ack_raw(delivery_tag).await?;

        let mut conn = self.conn().await?;
        let dedup_key = self.dedup_key(message);
        conn.del::<_, ()>(&dedup_key).await?;
        Ok(())
    }

    async fn claim_stale(
        &self,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<(String, QueueMessage)>> {
        let mut conn = self.conn().await?;
        let min_idle_ms = min_idle.as_millis() as u64;

        let pending_count: usize = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .query_async(&mut conn)
            .await
            .map(|reply: redis::streams::StreamPendingReply| reply.count())
            .unwrap_or(0);
        if pending_count == 0 {
            return Ok(Vec::new());
        }

        let pending_details: Vec<Vec<redis::Value>> = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let mut to_claim = Vec::new();
        for detail in pending_details {
            // Format: [id, consumer, idle_time_ms, delivery_count]
            if let (Some(redis::Value::BulkString(id_bytes)), Some(redis::Value::Int(idle_ms))) =
                (detail.first(), detail.get(2))
            {
                if *idle_ms as u64 >= min_idle_ms {
                    if let Ok(id) = String::from_utf8(id_bytes.clone()) {
                        to_claim.push(id);
                    }
                }
            }
        }
        if to_claim.is_empty() {
            return Ok(Vec::new());
        }

        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg(min_idle_ms);
        for id in &to_claim {
            cmd.arg(id);
        }

        let claimed: Vec<Vec<redis::Value>> = cmd.query_async(&mut conn).await?;

        let mut tickets = Vec::new();
        for entry in claimed {
            // Format: [id, [field, value, ...]]
            let (Some(redis::Value::BulkString(id_bytes)), Some(redis::Value::Array(fields))) =
                (entry.first(), entry.get(1))
            else {
                continue;
            };
            let Ok(message_id) = String::from_utf8(id_bytes.clone()) else {
                continue;
            };

            let mut payload: Option<String> = None;
            let mut i = 0;
            while i + 1 < fields.len() {
                if let (
                    Some(redis::Value::BulkString(field)),
                    Some(redis::Value::BulkString(value)),
                ) = (fields.get(i), fields.get(i + 1))
                {
                    if field.as_slice() == b"ticket" {
                        payload = String::from_utf8(value.clone()).ok();
                        break;
                    }
                }
                i += 2;
            }

            if let Some(payload) = payload {
                match serde_json::from_str::<QueueMessage>(&payload) {
                    Ok(message) => {
                        info!(job_id = %message.job_id, "claimed stale ticket");
                        tickets.push((message_id, message));
                    }
                    Err(e) => {
                        warn!("failed to parse claimed ticket: {}", e);
                        self.ack_raw(&message_id).await.ok();
                    }
                }
            }
        }

        Ok(tickets)
    }

    async fn dead_letter(
        &self,
        delivery_tag: &str,
        message: &QueueMessage,
        error: &str,
    ) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(message)?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg("ticket")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(delivery_tag)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack_raw(delivery_tag).await?;

        let dedup_key = self.dedup_key(message);
        conn.del::<_, ()>(&dedup_key).await?;

        warn!(job_id = %message.job_id, error = error, "ticket dead-lettered");
        Ok(())
    }

    async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.xlen(&self.config.stream_name).await?)
    }

    async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.xlen(&self.config.dlq_stream_name).await?)
    }
}
