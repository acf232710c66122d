//! The worker loop.
//!
//! `StreamWorker` reads entries from every configured queue, splitting each
//! read across queues by weight, and runs at most `concurrency` handlers at
//! once. After the handler returns the entry is acknowledged; failures are
//! re-queued with `retry_count + 1` or dead-lettered depending on the error
//! category and the retry budget.
//!
//! Shutdown stops reading and waits for every in-flight job. Handlers are
//! never cancelled mid-job.

use crate::config::WorkerConfig;
use crate::consumer::StreamConsumer;
use crate::error::StreamError;
use crate::job::{JobHandler, StreamEntry};
use crate::metrics::StreamMetrics;
use crate::producer::StreamProducer;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

const MAX_BACKOFF_SECS: u64 = 30;
const RECOVER_BATCH: usize = 100;

/// What happens to an entry whose handler failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Re-add to the same queue with this retry count
    Requeue { retry_count: u32 },
    /// Move to the queue's dead letter stream
    DeadLetter,
}

impl Disposition {
    pub fn for_failure(error: &StreamError, retry_count: u32, max_retries: u32) -> Self {
        if error.should_retry(retry_count, max_retries) {
            Disposition::Requeue {
                retry_count: retry_count + 1,
            }
        } else {
            Disposition::DeadLetter
        }
    }
}

/// Everything a spawned job needs
struct JobContext<H: JobHandler> {
    consumer: StreamConsumer,
    producer: StreamProducer,
    handler: Arc<H>,
    config: Arc<WorkerConfig>,
    metrics: StreamMetrics,
    in_flight: Arc<AtomicUsize>,
}

impl<H: JobHandler> Clone for JobContext<H> {
    fn clone(&self) -> Self {
        Self {
            consumer: self.consumer.clone(),
            producer: self.producer.clone(),
            handler: Arc::clone(&self.handler),
            config: Arc::clone(&self.config),
            metrics: self.metrics.clone(),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<H: JobHandler> JobContext<H> {
    async fn process(&self, entry: StreamEntry) {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.metrics.in_flight(current);

        let started = Instant::now();
        let deadline = started + self.config.job_timeout;

        debug!(
            stream = %entry.queue,
            entry_id = %entry.entry_id,
            job_id = %entry.job_id,
            retry_count = entry.retry_count,
            "Processing job"
        );

        match self.handler.handle(&entry, deadline).await {
            Ok(()) => {
                self.metrics.job_processed(&entry.queue, started.elapsed());
            }
            Err(e) => {
                self.metrics.job_failed(&entry.queue, e.kind(), started.elapsed());
                self.settle_failure(&entry, &e).await;
            }
        }

        // Ack even if the re-queue/DLQ write failed, otherwise the entry loops forever
        if let Err(e) = self.consumer.ack(&entry.queue, &entry.entry_id).await {
            error!(stream = %entry.queue, entry_id = %entry.entry_id, error = %e, "Failed to ACK entry");
        }

        let current = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        self.metrics.in_flight(current);
    }

    async fn settle_failure(&self, entry: &StreamEntry, error: &StreamError) {
        match Disposition::for_failure(error, entry.retry_count, self.config.max_retries) {
            Disposition::Requeue { retry_count } => match self.producer.requeue(entry, retry_count).await {
                Ok(_) => {
                    self.metrics.job_retried(&entry.queue);
                    warn!(
                        job_id = %entry.job_id,
                        stream = %entry.queue,
                        retry_count,
                        error = %error,
                        "Job failed, re-queued"
                    );
                }
                Err(e) => {
                    error!(job_id = %entry.job_id, error = %e, "Failed to re-queue job");
                }
            },
            Disposition::DeadLetter => {
                let dlq = self.config.dlq_stream(&entry.queue);
                match self.producer.dead_letter(entry, &dlq, &error.to_string()).await {
                    Ok(_) => {
                        self.metrics.job_dead_lettered(&entry.queue);
                        warn!(
                            job_id = %entry.job_id,
                            stream = %entry.queue,
                            error_category = error.category().as_str(),
                            error = %error,
                            "Job dead-lettered"
                        );
                    }
                    Err(e) => {
                        error!(job_id = %entry.job_id, error = %e, "Failed to dead-letter job");
                    }
                }
            }
        }
    }
}

/// Redis Streams worker driving a [`JobHandler`]
pub struct StreamWorker<H: JobHandler> {
    ctx: JobContext<H>,
    semaphore: Arc<Semaphore>,
}

impl<H: JobHandler> StreamWorker<H> {
    pub fn new(redis: ConnectionManager, handler: H, config: WorkerConfig) -> Self {
        Self::with_arc_handler(redis, Arc::new(handler), config)
    }

    pub fn with_arc_handler(redis: ConnectionManager, handler: Arc<H>, config: WorkerConfig) -> Self {
        let consumer = StreamConsumer::new(redis.clone(), &config);
        let producer = StreamProducer::new(redis).with_max_length(config.max_length);
        let metrics = StreamMetrics::new(config.metrics_prefix.clone());
        let semaphore = Arc::new(Semaphore::new(config.concurrency));

        Self {
            ctx: JobContext {
                consumer,
                producer,
                handler,
                config: Arc::new(config),
                metrics,
                in_flight: Arc::new(AtomicUsize::new(0)),
            },
            semaphore,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.ctx.config
    }

    /// Number of jobs currently inside the handler
    pub fn in_flight(&self) -> usize {
        self.ctx.in_flight.load(Ordering::SeqCst)
    }

    /// Run until `shutdown` flips to `true` (or its sender is dropped), then
    /// wait for in-flight jobs.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), StreamError> {
        let config = Arc::clone(&self.ctx.config);

        info!(
            consumer_id = %config.consumer_id,
            group = %config.consumer_group,
            queues = ?config.queues.iter().map(|q| (q.name.as_str(), q.weight)).collect::<Vec<_>>(),
            concurrency = config.concurrency,
            handler = self.ctx.handler.name(),
            "Starting stream worker"
        );

        for queue in &config.queues {
            self.ctx.consumer.ensure_group(&queue.name).await?;
        }

        let mut jobs: JoinSet<()> = JoinSet::new();
        self.recover(&mut jobs).await;

        let poll_interval = Duration::from_millis(config.poll_interval_ms);
        let claim_interval = Duration::from_millis(config.claim_idle_ms);
        let mut last_claim = Instant::now();
        let mut consecutive_errors: u32 = 0;

        loop {
            if *shutdown.borrow() || shutdown.has_changed().is_err() {
                info!("Received shutdown signal, stopping worker");
                break;
            }

            while jobs.try_join_next().is_some() {}

            let capacity = self.semaphore.available_permits();
            if capacity == 0 {
                tokio::select! {
                    _ = shutdown.changed() => {}
                    _ = jobs.join_next() => {}
                }
                continue;
            }

            match self.read_batch(capacity).await {
                Ok(entries) => {
                    if consecutive_errors > 0 {
                        info!(consecutive_errors, "Redis recovered");
                        consecutive_errors = 0;
                    }

                    if entries.is_empty() {
                        tokio::select! {
                            _ = shutdown.changed() => {}
                            _ = tokio::time::sleep(poll_interval) => {}
                        }
                    }

                    for entry in entries {
                        self.spawn(&mut jobs, entry);
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    let backoff_secs = 2u64.pow(consecutive_errors.min(5)).min(MAX_BACKOFF_SECS);
                    warn!(
                        error = %e,
                        consecutive_errors,
                        backoff_secs,
                        "Failed to read from queues, backing off"
                    );
                    tokio::select! {
                        _ = shutdown.changed() => {}
                        _ = tokio::time::sleep(Duration::from_secs(backoff_secs)) => {}
                    }
                    continue;
                }
            }

            if last_claim.elapsed() >= claim_interval {
                self.claim_abandoned(&mut jobs).await;
                last_claim = Instant::now();
            }
        }

        if !jobs.is_empty() {
            info!(in_flight = jobs.len(), "Waiting for in-flight jobs");
        }
        while jobs.join_next().await.is_some() {}

        info!("Stream worker stopped");
        Ok(())
    }

    async fn read_batch(&self, capacity: usize) -> Result<Vec<StreamEntry>, StreamError> {
        let mut entries = Vec::new();
        for (queue, share) in self.ctx.config.batch_shares(capacity) {
            entries.extend(self.ctx.consumer.read_new(queue, share).await?);
        }
        Ok(entries)
    }

    /// Re-run entries this consumer left unacknowledged, then claim entries
    /// abandoned by dead consumers.
    async fn recover(&self, jobs: &mut JoinSet<()>) {
        for queue in &self.ctx.config.queues {
            match self.ctx.consumer.read_pending(&queue.name, RECOVER_BATCH).await {
                Ok(entries) => {
                    if !entries.is_empty() {
                        info!(stream = %queue.name, count = entries.len(), "Recovering pending entries");
                    }
                    for entry in entries {
                        self.spawn(jobs, entry);
                    }
                }
                Err(e) => warn!(stream = %queue.name, error = %e, "Failed to read pending entries"),
            }
        }
        self.claim_abandoned(jobs).await;
    }

    async fn claim_abandoned(&self, jobs: &mut JoinSet<()>) {
        for queue in &self.ctx.config.queues {
            match self.ctx.consumer.claim_abandoned(&queue.name, RECOVER_BATCH).await {
                Ok(entries) => {
                    for entry in entries {
                        self.spawn(jobs, entry);
                    }
                }
                Err(e) => debug!(stream = %queue.name, error = %e, "Error claiming abandoned entries"),
            }
        }
    }

    fn spawn(&self, jobs: &mut JoinSet<()>, entry: StreamEntry) {
        let ctx = self.ctx.clone();
        let semaphore = Arc::clone(&self.semaphore);

        jobs.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            ctx.process(entry).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_failure_is_requeued_with_next_retry_count() {
        let err = StreamError::transient("send_failed", "smtp down");

        assert_eq!(
            Disposition::for_failure(&err, 0, 3),
            Disposition::Requeue { retry_count: 1 }
        );
        assert_eq!(
            Disposition::for_failure(&err, 2, 3),
            Disposition::Requeue { retry_count: 3 }
        );
    }

    #[test]
    fn test_exhausted_retries_dead_letter() {
        let err = StreamError::transient("send_failed", "smtp down");
        assert_eq!(Disposition::for_failure(&err, 3, 3), Disposition::DeadLetter);
    }

    #[test]
    fn test_permanent_failure_dead_letters_immediately() {
        let err = StreamError::permanent("history_update_failed", "mail already sent");
        assert_eq!(Disposition::for_failure(&err, 0, 3), Disposition::DeadLetter);
    }
}
