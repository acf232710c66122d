//! Stream Worker Framework
//!
//! Redis Streams queue worker with weighted multi-queue reads, bounded
//! concurrency, retry with re-queue, dead letter streams and health routes.
//!
//! ## Example
//!
//! ```ignore
//! use stream_worker::{JobHandler, QueueSpec, StreamWorker, WorkerConfig};
//!
//! let queues = QueueSpec::parse_list("mail:critical=6,mail:default=3,mail:low=1")?;
//! let config = WorkerConfig::new(queues, "mail_workers").with_concurrency(10);
//!
//! let worker = StreamWorker::new(redis, MyHandler::new(), config);
//! worker.run(shutdown_rx).await?;
//! ```

mod config;
mod consumer;
mod error;
mod health;
mod job;
pub mod metrics;
mod producer;
mod worker;

pub use config::{QueueSpec, WorkerConfig};
pub use consumer::StreamConsumer;
pub use error::{ErrorCategory, StreamError};
pub use health::{ClientsProbe, HealthResponse, HealthState, health_router};
pub use job::{FIELD_JOB, FIELD_JOB_ID, FIELD_RETRY_COUNT, JobHandler, StreamEntry};
pub use metrics::{StreamMetrics, init_metrics, render_metrics};
pub use producer::StreamProducer;
pub use worker::{Disposition, StreamWorker};
