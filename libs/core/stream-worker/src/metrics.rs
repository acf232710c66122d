//! Prometheus metrics for stream workers
//!
//! Names are `<prefix>_jobs_processed_total` etc., labelled by queue.

use crate::error::StreamError;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::time::Duration;
use tracing::info;

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder. Subsequent calls are no-ops.
pub fn init_metrics() -> Result<(), StreamError> {
    PROMETHEUS_HANDLE.get_or_try_init(|| {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| StreamError::Config(format!("Failed to install Prometheus recorder: {}", e)))?;
        info!("Prometheus metrics initialized");
        Ok::<_, StreamError>(handle)
    })?;
    Ok(())
}

/// Render metrics in Prometheus format, `None` before `init_metrics`
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

/// Job lifecycle metrics
#[derive(Debug, Clone)]
pub struct StreamMetrics {
    prefix: String,
}

impl StreamMetrics {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    fn name(&self, metric: &str) -> String {
        format!("{}_{}", self.prefix, metric)
    }

    pub fn job_processed(&self, queue: &str, duration: Duration) {
        counter!(self.name("jobs_processed_total"), "queue" => queue.to_string()).increment(1);
        self.job_duration(queue, duration);
    }

    pub fn job_failed(&self, queue: &str, kind: &'static str, duration: Duration) {
        counter!(
            self.name("jobs_failed_total"),
            "queue" => queue.to_string(),
            "kind" => kind
        )
        .increment(1);
        self.job_duration(queue, duration);
    }

    fn job_duration(&self, queue: &str, duration: Duration) {
        histogram!(self.name("job_duration_seconds"), "queue" => queue.to_string())
            .record(duration.as_secs_f64());
    }

    pub fn job_retried(&self, queue: &str) {
        counter!(self.name("jobs_retried_total"), "queue" => queue.to_string()).increment(1);
    }

    pub fn job_dead_lettered(&self, queue: &str) {
        counter!(self.name("jobs_dead_lettered_total"), "queue" => queue.to_string()).increment(1);
    }

    pub fn in_flight(&self, count: usize) {
        gauge!(self.name("jobs_in_flight")).set(count as f64);
    }
}
