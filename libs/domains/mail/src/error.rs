//! Error types for the mail domain.

use grpc_client::PoolError;
use stream_worker::{ErrorCategory, StreamError};
use thiserror::Error;

/// Result type for mail operations.
pub type MailResult<T> = Result<T, MailError>;

/// Errors that can occur while processing one mail job.
///
/// Display strings double as the `failed` status message.
#[derive(Debug, Error)]
pub enum MailError {
    /// Job payload is not valid JSON for a mail job.
    #[error("Failed to parse payload: {0}")]
    Parse(String),

    /// Template lookup returned nothing or failed.
    #[error("Failed to get mail template: {0}")]
    TemplateNotFound(String),

    /// Template subject or body could not be rendered with the job data.
    #[error("Failed to render mail template: {0}")]
    Render(String),

    /// Provider lookup returned nothing or failed.
    #[error("Failed to get mail provider: {0}")]
    ProviderNotFound(String),

    /// The transport rejected or could not complete the send.
    #[error("Failed to send mail: {0}")]
    SendFailed(String),

    /// The deadline cut a send short. The server may already hold the mail.
    #[error("Mail send interrupted, delivery unknown: {0}")]
    SendInterrupted(String),

    /// The mail went out but its history record was not updated.
    #[error("Failed to update mail history: {0}")]
    HistoryUpdateFailed(String),

    /// A status event could not be recorded. Never fails a job.
    #[error("Failed to record status: {0}")]
    StatusRecordFailed(String),

    /// The endpoint serving a lookup could not be reached.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl MailError {
    /// Short machine-readable kind, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            MailError::Parse(_) => "parse_error",
            MailError::TemplateNotFound(_) => "template_not_found",
            MailError::Render(_) => "render_error",
            MailError::ProviderNotFound(_) => "provider_not_found",
            MailError::SendFailed(_) => "send_failed",
            MailError::SendInterrupted(_) => "send_interrupted",
            MailError::HistoryUpdateFailed(_) => "history_update_failed",
            MailError::StatusRecordFailed(_) => "status_record_failed",
            MailError::Pool(PoolError::DialFailed { .. }) => "dial_failed",
            MailError::Pool(PoolError::EndpointUnconfigured(_)) => "endpoint_unconfigured",
            MailError::Pool(PoolError::CloseFailed(_)) => "close_failed",
        }
    }

    /// Whether the queue runtime may retry the job.
    ///
    /// An interrupted send or a history failure may follow a delivered
    /// mail, so retrying either could send it twice. An unconfigured
    /// endpoint stays unconfigured until redeploy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            MailError::SendFailed(_)
            | MailError::StatusRecordFailed(_)
            | MailError::Pool(PoolError::DialFailed { .. })
            | MailError::Pool(PoolError::CloseFailed(_)) => ErrorCategory::Transient,
            MailError::Parse(_)
            | MailError::TemplateNotFound(_)
            | MailError::Render(_)
            | MailError::ProviderNotFound(_)
            | MailError::SendInterrupted(_)
            | MailError::HistoryUpdateFailed(_)
            | MailError::Pool(PoolError::EndpointUnconfigured(_)) => ErrorCategory::Permanent,
        }
    }
}

impl From<MailError> for StreamError {
    fn from(err: MailError) -> Self {
        match err.category() {
            ErrorCategory::Transient => StreamError::transient(err.kind(), err.to_string()),
            ErrorCategory::Permanent => StreamError::permanent(err.kind(), err.to_string()),
        }
    }
}

impl From<serde_json::Error> for MailError {
    fn from(err: serde_json::Error) -> Self {
        MailError::Parse(err.to_string())
    }
}

impl From<handlebars::RenderError> for MailError {
    fn from(err: handlebars::RenderError) -> Self {
        MailError::Render(err.to_string())
    }
}
