//! Stream consumer for Redis operations
//!
//! Reads entries from the configured queues using one consumer group.

use crate::config::WorkerConfig;
use crate::error::StreamError;
use crate::job::{FIELD_JOB, FIELD_JOB_ID, FIELD_RETRY_COUNT, StreamEntry};
use redis::aio::ConnectionManager;
use redis::streams::{StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadReply};
use redis::RedisResult;
use tracing::{debug, info, warn};

/// Stream consumer for Redis operations
#[derive(Clone)]
pub struct StreamConsumer {
    redis: ConnectionManager,
    consumer_group: String,
    consumer_id: String,
    claim_idle_ms: u64,
}

impl StreamConsumer {
    pub fn new(redis: ConnectionManager, config: &WorkerConfig) -> Self {
        Self {
            redis,
            consumer_group: config.consumer_group.clone(),
            consumer_id: config.consumer_id.clone(),
            claim_idle_ms: config.claim_idle_ms,
        }
    }

    /// Get the consumer ID
    pub fn consumer_id(&self) -> &str {
        &self.consumer_id
    }

    /// Create the consumer group for `queue` if it does not exist yet
    pub async fn ensure_group(&self, queue: &str) -> Result<(), StreamError> {
        let mut conn = self.redis.clone();

        let result: RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(queue)
            .arg(&self.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => {
                info!(stream = %queue, group = %self.consumer_group, "Created consumer group");
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(stream = %queue, group = %self.consumer_group, "Consumer group already exists");
            }
            Err(e) => return Err(StreamError::Redis(e)),
        }

        Ok(())
    }

    /// Entries delivered to this consumer but never acknowledged
    pub async fn read_pending(&self, queue: &str, count: usize) -> Result<Vec<StreamEntry>, StreamError> {
        self.read_group(queue, count, "0").await
    }

    /// Entries never delivered to any consumer of the group
    pub async fn read_new(&self, queue: &str, count: usize) -> Result<Vec<StreamEntry>, StreamError> {
        self.read_group(queue, count, ">").await
    }

    async fn read_group(&self, queue: &str, count: usize, from: &str) -> Result<Vec<StreamEntry>, StreamError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.redis.clone();

        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.consumer_group)
            .arg(&self.consumer_id)
            .arg("COUNT")
            .arg(count)
            .arg("STREAMS")
            .arg(queue)
            .arg(from)
            .query_async(&mut conn)
            .await?;

        Ok(reply
            .map(|reply| {
                reply
                    .keys
                    .into_iter()
                    .flat_map(|key| key.ids)
                    .map(|id| to_entry(queue, &id))
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Acknowledge an entry
    pub async fn ack(&self, queue: &str, entry_id: &str) -> Result<(), StreamError> {
        let mut conn = self.redis.clone();

        let _: i64 = redis::cmd("XACK")
            .arg(queue)
            .arg(&self.consumer_group)
            .arg(entry_id)
            .query_async(&mut conn)
            .await?;

        debug!(stream = %queue, entry_id = %entry_id, "Acknowledged entry");
        Ok(())
    }

    /// Claim entries other consumers left pending for longer than the idle bound
    pub async fn claim_abandoned(&self, queue: &str, count: usize) -> Result<Vec<StreamEntry>, StreamError> {
        let mut conn = self.redis.clone();

        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(queue)
            .arg(&self.consumer_group)
            .arg("IDLE")
            .arg(self.claim_idle_ms)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let claim_ids: Vec<String> = pending
            .ids
            .into_iter()
            .filter(|p| p.consumer != self.consumer_id)
            .map(|p| p.id)
            .collect();

        if claim_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(queue)
            .arg(&self.consumer_group)
            .arg(&self.consumer_id)
            .arg(self.claim_idle_ms);
        for id in &claim_ids {
            cmd.arg(id);
        }

        let claimed: StreamClaimReply = cmd.query_async(&mut conn).await?;
        let entries: Vec<StreamEntry> = claimed.ids.iter().map(|id| to_entry(queue, id)).collect();

        if !entries.is_empty() {
            warn!(stream = %queue, count = entries.len(), "Claimed abandoned entries");
        }

        Ok(entries)
    }
}

fn to_entry(queue: &str, id: &StreamId) -> StreamEntry {
    let payload = id.get::<String>(FIELD_JOB).unwrap_or_else(|| {
        warn!(stream = %queue, entry_id = %id.id, "Missing 'job' field in entry");
        String::new()
    });

    StreamEntry {
        queue: queue.to_string(),
        entry_id: id.id.clone(),
        job_id: id.get::<String>(FIELD_JOB_ID).unwrap_or_else(|| id.id.clone()),
        payload,
        retry_count: id.get::<u32>(FIELD_RETRY_COUNT).unwrap_or(0),
    }
}
