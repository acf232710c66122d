//! Worker configuration
//!
//! This module provides `WorkerConfig` for configuring the stream worker.

use crate::error::StreamError;
use std::time::Duration;
use uuid::Uuid;

/// A named queue (Redis stream) and its share of each read batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    pub name: String,
    pub weight: u32,
}

impl QueueSpec {
    pub fn new(name: impl Into<String>, weight: u32) -> Self {
        Self {
            name: name.into(),
            weight: weight.max(1),
        }
    }

    /// Parse `name=weight,name=weight`. A bare name gets weight 1.
    pub fn parse_list(spec: &str) -> Result<Vec<QueueSpec>, StreamError> {
        let mut queues: Vec<QueueSpec> = Vec::new();

        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, weight) = match entry.split_once('=') {
                Some((name, weight)) => {
                    let weight = weight.trim().parse::<u32>().map_err(|e| {
                        StreamError::Config(format!("invalid weight in '{}': {}", entry, e))
                    })?;
                    (name.trim(), weight)
                }
                None => (entry, 1),
            };

            if name.is_empty() {
                return Err(StreamError::Config(format!("missing queue name in '{}'", entry)));
            }
            if weight == 0 {
                return Err(StreamError::Config(format!("queue '{}' has weight 0", name)));
            }
            if queues.iter().any(|q| q.name == name) {
                return Err(StreamError::Config(format!("duplicate queue '{}'", name)));
            }

            queues.push(QueueSpec::new(name, weight));
        }

        if queues.is_empty() {
            return Err(StreamError::Config("no queues configured".to_string()));
        }

        Ok(queues)
    }
}

/// Configuration for the stream worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queues to consume, with their weights
    pub queues: Vec<QueueSpec>,

    /// Consumer group name
    pub consumer_group: String,

    /// Unique consumer ID (auto-generated if not provided)
    pub consumer_id: String,

    /// Suffix appended to a queue name to form its dead letter stream
    pub dlq_suffix: String,

    /// Maximum stream length before trimming (MAXLEN ~)
    pub max_length: i64,

    /// Sleep between reads when every queue was empty
    pub poll_interval_ms: u64,

    /// Maximum concurrent jobs to process
    pub concurrency: usize,

    /// Transient failures are re-queued this many times before dead-lettering
    pub max_retries: u32,

    /// Entries pending longer than this on another consumer are claimed
    pub claim_idle_ms: u64,

    /// Deadline handed to the handler for each job
    pub job_timeout: Duration,

    /// Prefix of every metric name, e.g. `mail` -> `mail_jobs_processed_total`
    pub metrics_prefix: String,
}

impl WorkerConfig {
    /// Create a new WorkerConfig with explicit queues
    pub fn new(queues: Vec<QueueSpec>, consumer_group: impl Into<String>) -> Self {
        Self {
            queues,
            consumer_group: consumer_group.into(),
            consumer_id: format!("worker-{}", Uuid::new_v4()),
            dlq_suffix: ":dlq".to_string(),
            max_length: 100_000,
            poll_interval_ms: 500,
            concurrency: 10,
            max_retries: 3,
            claim_idle_ms: 60_000,
            job_timeout: Duration::from_secs(60),
            metrics_prefix: "stream_worker".to_string(),
        }
    }

    /// Set the consumer ID
    pub fn with_consumer_id(mut self, id: impl Into<String>) -> Self {
        self.consumer_id = id.into();
        self
    }

    /// Set the DLQ suffix
    pub fn with_dlq_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.dlq_suffix = suffix.into();
        self
    }

    /// Set the maximum stream length
    pub fn with_max_length(mut self, max_length: i64) -> Self {
        self.max_length = max_length;
        self
    }

    /// Set the poll interval
    pub fn with_poll_interval_ms(mut self, interval: u64) -> Self {
        self.poll_interval_ms = interval;
        self
    }

    /// Set the maximum concurrent jobs
    pub fn with_concurrency(mut self, count: usize) -> Self {
        self.concurrency = count.max(1);
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the idle time after which other consumers' entries are claimed
    pub fn with_claim_idle_ms(mut self, idle: u64) -> Self {
        self.claim_idle_ms = idle;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn with_metrics_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.metrics_prefix = prefix.into();
        self
    }

    /// Dead letter stream for `queue`
    pub fn dlq_stream(&self, queue: &str) -> String {
        format!("{}{}", queue, self.dlq_suffix)
    }

    /// Split a read of `capacity` entries across the queues by weight.
    ///
    /// Every queue is offered at least one slot so a low-weight queue is
    /// never starved; the rest is shared proportionally. The result may
    /// exceed `capacity` by at most the number of queues.
    pub fn batch_shares(&self, capacity: usize) -> Vec<(&str, usize)> {
        if capacity == 0 {
            return Vec::new();
        }

        let total: u64 = self.queues.iter().map(|q| u64::from(q.weight)).sum();

        self.queues
            .iter()
            .map(|q| {
                let share = (capacity as u64 * u64::from(q.weight) / total.max(1)) as usize;
                (q.name.as_str(), share.max(1))
            })
            .collect()
    }
}
