//! Mail transports and the per-job dispatcher.
//!
//! `MailTransport` is the network capability (SMTP in production, in-memory
//! fakes in tests). `MailDispatcher` holds the provider settings for one job
//! and performs exactly one delivery attempt with them.

mod smtp;

pub use smtp::SmtpTransport;

use crate::error::{MailError, MailResult};
use crate::models::MailProvider;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Connection and sender settings for one delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
    /// TLS from the first byte instead of a STARTTLS upgrade.
    pub implicit_tls: bool,
    /// Accept invalid server certificates.
    pub skip_tls_verify: bool,
    pub timeout: Duration,
}

/// A message ready for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub recipients: Vec<String>,
    pub subject: String,
    /// HTML body.
    pub body: String,
    /// Job data, for transports that need more than the rendered body.
    pub data: Map<String, Value>,
}

/// Network capability that delivers one message.
#[async_trait]
pub trait MailTransport: Send + Sync + 'static {
    /// One delivery attempt. No retries.
    async fn deliver(&self, settings: &TransportSettings, mail: &OutgoingMail) -> MailResult<()>;

    /// Transport name for logging.
    fn name(&self) -> &'static str;
}

/// Options applied to every provider a dispatcher is configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    pub skip_tls_verify: bool,
    pub timeout: Duration,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            skip_tls_verify: false,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Per-job wrapper around a [`MailTransport`].
///
/// Not shared between jobs: `configure` and `send` take `&mut self`, and
/// the settings are cleared after every send.
pub struct MailDispatcher<T: MailTransport> {
    transport: Arc<T>,
    options: DispatchOptions,
    settings: Option<TransportSettings>,
}

impl<T: MailTransport> MailDispatcher<T> {
    pub fn new(transport: Arc<T>, options: DispatchOptions) -> Self {
        Self {
            transport,
            options,
            settings: None,
        }
    }

    /// Replace credentials and security settings with `provider`'s.
    pub fn configure(&mut self, provider: &MailProvider) -> &mut Self {
        if self.options.skip_tls_verify {
            warn!(
                host = %provider.host,
                provider = %provider.email,
                "TLS certificate verification disabled for SMTP"
            );
        }

        self.settings = Some(TransportSettings {
            host: provider.host.clone(),
            port: provider.port,
            username: provider.username.clone(),
            password: provider.password.clone(),
            from_email: provider.email.clone(),
            from_name: provider.name.clone(),
            implicit_tls: provider.implicit_tls(),
            skip_tls_verify: self.options.skip_tls_verify,
            timeout: self.options.timeout,
        });
        self
    }

    pub fn is_configured(&self) -> bool {
        self.settings.is_some()
    }

    /// Deliver once with the configured provider, then reset.
    pub async fn send(
        &mut self,
        recipients: &[String],
        subject: &str,
        body: &str,
        data: &Map<String, Value>,
    ) -> MailResult<()> {
        let settings = self
            .settings
            .take()
            .ok_or_else(|| MailError::SendFailed("dispatcher has no provider configured".to_string()))?;

        let mail = OutgoingMail {
            recipients: recipients.to_vec(),
            subject: subject.to_string(),
            body: body.to_string(),
            data: data.clone(),
        };

        debug!(
            transport = self.transport.name(),
            host = %settings.host,
            port = settings.port,
            recipients = mail.recipients.len(),
            "Dispatching mail"
        );

        self.transport.deliver(&settings, &mail).await
    }
}
