use std::time::Duration;
use thiserror::Error;

pub type GrpcResult<T> = Result<T, GrpcError>;
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors raised while dialing a single endpoint
#[derive(Error, Debug)]
pub enum GrpcError {
  /// Invalid URI provided for connection
  #[error("Invalid URI: {0}")]
  InvalidUri(#[from] tonic::transport::Error),

  /// Failed to establish connection
  #[error("Connection failed: {0}")]
  ConnectionFailed(tonic::transport::Error),

  /// A dial attempt did not finish within the configured bound
  #[error("Connection timeout after {0:?}")]
  ConnectionTimeout(Duration),

  /// Invalid configuration
  #[error("Invalid configuration: {0}")]
  InvalidConfig(String),

  /// Releasing a connection failed
  #[error("Close failed: {0}")]
  CloseFailed(String),
}

impl GrpcError {
  /// Timeouts and refused connections are worth another attempt; a bad
  /// address never is.
  pub fn is_retryable(&self) -> bool {
    matches!(
      self,
      GrpcError::ConnectionFailed(_) | GrpcError::ConnectionTimeout(_)
    )
  }
}

/// Errors raised by [`crate::pool::ClientPool`]
#[derive(Error, Debug)]
pub enum PoolError {
  /// Every dial attempt for `key` failed; `source` is the last failure
  #[error("Dial to '{key}' failed: {source}")]
  DialFailed {
    key: String,
    #[source]
    source: GrpcError,
  },

  /// The key was never registered with the pool
  #[error("Endpoint '{0}' is not configured")]
  EndpointUnconfigured(String),

  /// One or more handles failed to close. The pool entries are gone regardless.
  #[error("Failed to close {} client(s): {}", .0.len(), close_failures(.0))]
  CloseFailed(Vec<(String, GrpcError)>),
}

fn close_failures(failures: &[(String, GrpcError)]) -> String {
  failures
    .iter()
    .map(|(key, err)| format!("{key}: {err}"))
    .collect::<Vec<_>>()
    .join(", ")
}
