//! Stream producer for job enqueuing
//!
//! Used by services that submit jobs, by the worker itself to re-queue
//! transient failures and to dead-letter exhausted ones.
//!
//! # Example
//!
//! ```rust,ignore
//! use stream_worker::StreamProducer;
//!
//! let producer = StreamProducer::new(redis);
//! let entry_id = producer.enqueue("mail:default", "history-42", &payload_json).await?;
//! ```

use crate::error::StreamError;
use crate::job::{FIELD_JOB, FIELD_JOB_ID, FIELD_RETRY_COUNT, StreamEntry};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, info};

/// Stream producer for enqueuing jobs
#[derive(Clone)]
pub struct StreamProducer {
    redis: ConnectionManager,
    max_length: i64,
}

impl StreamProducer {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            redis,
            max_length: 100_000,
        }
    }

    /// Set the maximum stream length (MAXLEN ~).
    pub fn with_max_length(mut self, max_length: i64) -> Self {
        self.max_length = max_length;
        self
    }

    async fn xadd(&self, stream: &str, fields: &[(&str, &str)]) -> Result<String, StreamError> {
        let mut conn = self.redis.clone();

        // approximate trimming
        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_length)
            .arg("*");
        for (key, value) in fields {
            cmd.arg(*key).arg(*value);
        }

        Ok(cmd.query_async(&mut conn).await?)
    }

    /// Enqueue a job. Returns the Redis stream entry ID.
    pub async fn enqueue(&self, queue: &str, job_id: &str, payload: &str) -> Result<String, StreamError> {
        let entry_id = self
            .xadd(queue, &[(FIELD_JOB, payload), (FIELD_JOB_ID, job_id)])
            .await?;

        debug!(stream = %queue, entry_id = %entry_id, job_id = %job_id, "Enqueued job");
        Ok(entry_id)
    }

    /// Re-add `entry` to its queue with the given retry count
    pub async fn requeue(&self, entry: &StreamEntry, retry_count: u32) -> Result<String, StreamError> {
        let retry = retry_count.to_string();
        let entry_id = self
            .xadd(
                &entry.queue,
                &[
                    (FIELD_JOB, entry.payload.as_str()),
                    (FIELD_JOB_ID, entry.job_id.as_str()),
                    (FIELD_RETRY_COUNT, retry.as_str()),
                ],
            )
            .await?;

        debug!(
            stream = %entry.queue,
            job_id = %entry.job_id,
            retry_count,
            "Re-queued job"
        );
        Ok(entry_id)
    }

    /// Move `entry` to `dlq_stream`, keeping the payload and the failure reason
    pub async fn dead_letter(&self, entry: &StreamEntry, dlq_stream: &str, error: &str) -> Result<String, StreamError> {
        let retry = entry.retry_count.to_string();
        let failed_at = chrono::Utc::now().to_rfc3339();

        let dlq_id = self
            .xadd(
                dlq_stream,
                &[
                    (FIELD_JOB, entry.payload.as_str()),
                    (FIELD_JOB_ID, entry.job_id.as_str()),
                    (FIELD_RETRY_COUNT, retry.as_str()),
                    ("source_stream", entry.queue.as_str()),
                    ("source_id", entry.entry_id.as_str()),
                    ("error", error),
                    ("failed_at", failed_at.as_str()),
                ],
            )
            .await?;

        info!(
            job_id = %entry.job_id,
            dlq = %dlq_stream,
            dlq_id = %dlq_id,
            error = %error,
            retry_count = entry.retry_count,
            "Moved job to DLQ"
        );
        Ok(dlq_id)
    }

    /// Get the current stream length.
    pub async fn stream_length(&self, stream: &str) -> Result<i64, StreamError> {
        let mut conn = self.redis.clone();
        let len: i64 = conn.xlen(stream).await?;
        Ok(len)
    }
}
