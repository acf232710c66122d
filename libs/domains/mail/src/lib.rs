//! Mail Domain
//!
//! Turns a queued mail job into one delivered email plus an audit trail.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   Redis Stream  │  ← mail:critical / mail:default / mail:low
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │ MailJobProcessor│  ← parse, template, render, provider, send, history
//! └───┬─────────┬───┘
//!     │         │
//! ┌───▼─────┐ ┌─▼───────────────┐
//! │ Mail    │ │ MailDispatcher  │  ← SMTP via lettre
//! │ Service │ └─────────────────┘
//! └───┬─────┘
//!     │  gRPC over the shared ClientPool
//! ┌───▼─────────────┐
//! │  mail-service   │  ← templates, providers, history, status
//! └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_mail::{GrpcMailService, HandlebarsRenderer, MailJobProcessor, ProcessorConfig, SmtpTransport};
//!
//! let processor = MailJobProcessor::new(
//!     Arc::new(GrpcMailService::new(pool, "mail-service")),
//!     Arc::new(HandlebarsRenderer::new()),
//!     Arc::new(SmtpTransport::new()),
//!     ProcessorConfig::default(),
//! );
//! let worker = StreamWorker::new(redis, processor, worker_config);
//! ```

pub mod error;
pub mod models;
pub mod processor;
pub mod providers;
pub mod service;
pub mod templates;

pub use error::{MailError, MailResult};
pub use models::{
    Encryption, HistoryUpdate, JobPayload, LifecycleStatus, MailProvider, MailStatus, MailTemplate,
    RenderedMessage, StatusEvent,
};
pub use processor::{MailJobProcessor, ProcessorConfig};
pub use providers::{DispatchOptions, MailDispatcher, MailTransport, OutgoingMail, SmtpTransport, TransportSettings};
pub use service::{GrpcMailService, MailService, ServiceError};
pub use templates::{HandlebarsRenderer, TemplateRenderer};
