//! Queue entries and the handler trait the worker drives.

use crate::error::StreamError;
use async_trait::async_trait;
use tokio::time::Instant;

/// Field holding the raw job payload
pub const FIELD_JOB: &str = "job";
/// Field holding the caller-assigned job id
pub const FIELD_JOB_ID: &str = "job_id";
/// Field holding the number of times the job was re-queued
pub const FIELD_RETRY_COUNT: &str = "retry_count";

/// One entry read from a queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// Queue (stream) the entry was read from
    pub queue: String,
    /// Redis stream entry ID (e.g., "1234567890123-0")
    pub entry_id: String,
    /// `job_id` field, or the entry id when the producer did not set one
    pub job_id: String,
    /// Raw `job` field. Empty when the field was missing.
    pub payload: String,
    /// `retry_count` field, 0 when absent
    pub retry_count: u32,
}

/// Domain handlers implement this to process raw queue entries.
///
/// ```rust,ignore
/// use stream_worker::{JobHandler, StreamEntry, StreamError};
///
/// struct Echo;
///
/// #[async_trait]
/// impl JobHandler for Echo {
///     async fn handle(&self, entry: &StreamEntry, _deadline: Instant) -> Result<(), StreamError> {
///         tracing::info!(payload = %entry.payload, "echo");
///         Ok(())
///     }
///
///     fn name(&self) -> &'static str {
///         "echo"
///     }
/// }
/// ```
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    /// Process one entry. The worker acknowledges the entry after this
    /// returns, and re-queues or dead-letters it based on the error category.
    async fn handle(&self, entry: &StreamEntry, deadline: Instant) -> Result<(), StreamError>;

    /// Handler name for logging
    fn name(&self) -> &'static str;
}
