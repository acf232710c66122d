//! Stream error types and error categorization
//!
//! The category decides what the worker does with a failed entry:
//! - **Transient**: re-added to its queue with `retry_count + 1` until the
//!   retry budget is spent, then dead-lettered
//! - **Permanent**: dead-lettered immediately

use thiserror::Error;

/// Category of error for determining retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Temporary failure, worth another delivery
    Transient,
    /// Retrying cannot help, or would repeat a side effect
    Permanent,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Transient => "transient",
            ErrorCategory::Permanent => "permanent",
        }
    }
}

/// Stream processing errors
#[derive(Error, Debug)]
pub enum StreamError {
    /// Redis connection or command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A handler rejected the job. `kind` labels the failure in metrics.
    #[error("Processing error ({kind}): {message}")]
    Processing {
        kind: &'static str,
        message: String,
        category: ErrorCategory,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StreamError {
    /// Create a transient processing error
    pub fn transient(kind: &'static str, message: impl Into<String>) -> Self {
        StreamError::Processing {
            kind,
            message: message.into(),
            category: ErrorCategory::Transient,
        }
    }

    /// Create a permanent processing error
    pub fn permanent(kind: &'static str, message: impl Into<String>) -> Self {
        StreamError::Processing {
            kind,
            message: message.into(),
            category: ErrorCategory::Permanent,
        }
    }

    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            StreamError::Redis(_) => ErrorCategory::Transient,
            StreamError::Serialization(_) => ErrorCategory::Permanent,
            StreamError::Processing { category, .. } => *category,
            StreamError::Config(_) => ErrorCategory::Permanent,
        }
    }

    /// Short label for the `kind` metric dimension
    pub fn kind(&self) -> &'static str {
        match self {
            StreamError::Redis(_) => "redis",
            StreamError::Serialization(_) => "serialization",
            StreamError::Processing { kind, .. } => kind,
            StreamError::Config(_) => "config",
        }
    }

    /// Whether a delivery that already has `retry_count` retries gets another
    pub fn should_retry(&self, retry_count: u32, max_retries: u32) -> bool {
        self.category() == ErrorCategory::Transient && retry_count < max_retries
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Serialization(err.to_string())
    }
}
