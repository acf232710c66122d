//! Exponential backoff for connection establishment.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry configuration for dialing endpoints
#[derive(Debug, Clone)]
pub struct RetryConfig {
  /// Retries after the first attempt (0 = try once)
  pub max_retries: u32,

  /// Delay before the first retry in milliseconds
  pub initial_delay_ms: u64,

  /// Upper bound for any single delay in milliseconds
  pub max_delay_ms: u64,

  /// Multiplier for exponential backoff
  pub backoff_multiplier: f64,

  /// Spread retries from many callers
  pub use_jitter: bool,
}

impl RetryConfig {
  /// Defaults: 3 retries, 100ms initial delay, 5s cap, x2, jitter on
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_max_retries(mut self, max_retries: u32) -> Self {
    self.max_retries = max_retries;
    self
  }

  pub fn with_initial_delay(mut self, delay_ms: u64) -> Self {
    self.initial_delay_ms = delay_ms;
    self
  }

  pub fn with_max_delay(mut self, delay_ms: u64) -> Self {
    self.max_delay_ms = delay_ms;
    self
  }

  pub fn without_jitter(mut self) -> Self {
    self.use_jitter = false;
    self
  }
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_retries: 3,
      initial_delay_ms: 100,
      max_delay_ms: 5000,
      backoff_multiplier: 2.0,
      use_jitter: true,
    }
  }
}

/// Retry an async operation with exponential backoff.
///
/// `should_retry` decides whether a given error is worth another attempt;
/// errors it rejects are returned immediately.
///
/// ## Example
/// ```ignore
/// use grpc_client::{retry_with_backoff, RetryConfig};
///
/// let channel = retry_with_backoff(
///     || create_channel("http://[::1]:50051"),
///     RetryConfig::new().with_max_retries(5),
///     GrpcError::is_retryable,
/// ).await?;
/// ```
pub async fn retry_with_backoff<F, Fut, T, E, R>(
  mut operation: F,
  config: RetryConfig,
  should_retry: R,
) -> Result<T, E>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, E>>,
  E: std::fmt::Display,
  R: Fn(&E) -> bool,
{
  let mut attempt = 0;
  let mut delay = config.initial_delay_ms;

  loop {
    match operation().await {
      Ok(result) => {
        if attempt > 0 {
          debug!(target: "grpc_client", attempt, "Operation succeeded after retry");
        }
        return Ok(result);
      }
      Err(e) => {
        attempt += 1;

        if attempt > config.max_retries || !should_retry(&e) {
          warn!(target: "grpc_client", attempts = attempt, error = %e, "Giving up");
          return Err(e);
        }

        let current_delay = if config.use_jitter {
          apply_jitter(delay)
        } else {
          delay
        };

        debug!(
          target: "grpc_client",
          attempt,
          max_retries = config.max_retries,
          delay_ms = current_delay,
          error = %e,
          "Attempt failed, retrying"
        );

        tokio::time::sleep(Duration::from_millis(current_delay)).await;

        delay = ((delay as f64 * config.backoff_multiplier) as u64).min(config.max_delay_ms);
      }
    }
  }
}

/// Scale a delay to a random 50-100% of its value.
fn apply_jitter(delay: u64) -> u64 {
  use std::collections::hash_map::RandomState;
  use std::hash::BuildHasher;

  let random_factor =
    (RandomState::new().hash_one(std::time::SystemTime::now()) % 50) as f64 / 100.0 + 0.5;

  (delay as f64 * random_factor) as u64
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;
  use std::sync::atomic::{AtomicU32, Ordering};

  fn fast() -> RetryConfig {
    RetryConfig::new().with_initial_delay(1).with_max_delay(2).without_jitter()
  }

  #[tokio::test]
  async fn test_retry_success_first_attempt() {
    let counter = Arc::new(AtomicU32::new(0));
    let c = counter.clone();

    let result = retry_with_backoff(
      || {
        let c = c.clone();
        async move {
          c.fetch_add(1, Ordering::SeqCst);
          Ok::<_, String>("ok")
        }
      },
      fast(),
      |_| true,
    )
    .await;

    assert_eq!(result.unwrap(), "ok");
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_retry_recovers_after_failures() {
    let counter = Arc::new(AtomicU32::new(0));
    let c = counter.clone();

    let result = retry_with_backoff(
      || {
        let c = c.clone();
        async move {
          if c.fetch_add(1, Ordering::SeqCst) < 2 {
            Err("not yet".to_string())
          } else {
            Ok(42)
          }
        }
      },
      fast(),
      |_| true,
    )
    .await;

    assert_eq!(result.unwrap(), 42);
    assert_eq!(counter.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn test_retry_exhausts_budget() {
    let counter = Arc::new(AtomicU32::new(0));
    let c = counter.clone();

    let result: Result<(), String> = retry_with_backoff(
      || {
        let c = c.clone();
        async move {
          c.fetch_add(1, Ordering::SeqCst);
          Err("down".to_string())
        }
      },
      fast().with_max_retries(2),
      |_| true,
    )
    .await;

    assert!(result.is_err());
    assert_eq!(counter.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn test_non_retryable_error_stops_immediately() {
    let counter = Arc::new(AtomicU32::new(0));
    let c = counter.clone();

    let result: Result<(), String> = retry_with_backoff(
      || {
        let c = c.clone();
        async move {
          c.fetch_add(1, Ordering::SeqCst);
          Err("bad address".to_string())
        }
      },
      fast(),
      |_| false,
    )
    .await;

    assert!(result.is_err());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_jitter_bounds() {
    for _ in 0..100 {
      let jittered = apply_jitter(1000);
      assert!((500..=1000).contains(&jittered));
    }
  }
}
