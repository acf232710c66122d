//! Data models for the mail domain.

use crate::error::{MailError, MailResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

// ============================================================================
// Job payload (one queue entry)
// ============================================================================

/// A mail job as submitted to the queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobPayload {
    /// Provider identifier (the sending address).
    pub provider: String,
    /// Single recipient. Wins over `tos` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Recipient list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tos: Option<Vec<String>>,
    /// Template identifier.
    pub template: String,
    /// Placeholder values. Missing and `null` both mean empty.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Map<String, Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

impl JobPayload {
    pub fn parse(raw: &str) -> MailResult<Self> {
        serde_json::from_str(raw).map_err(MailError::from)
    }

    /// Recipients named by the payload, before any test override.
    pub fn recipients(&self) -> Vec<String> {
        match (&self.to, &self.tos) {
            (Some(to), _) if !to.is_empty() => vec![to.clone()],
            (_, Some(tos)) => tos.clone(),
            _ => Vec::new(),
        }
    }
}

// ============================================================================
// Remote records (read-only here)
// ============================================================================

/// Lifecycle status shared by templates and providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LifecycleStatus {
    Active,
    Inactive,
}

impl From<i32> for LifecycleStatus {
    /// Wire encoding: 1 is active, anything else is inactive.
    fn from(value: i32) -> Self {
        if value == 1 {
            LifecycleStatus::Active
        } else {
            LifecycleStatus::Inactive
        }
    }
}

/// A mail template.
#[derive(Debug, Clone, PartialEq)]
pub struct MailTemplate {
    pub id: String,
    pub name: String,
    pub subject: String,
    pub body: String,
    /// Placeholder keys the template expects, in declaration order.
    pub keys: Vec<String>,
    pub provider_email: String,
    pub status: LifecycleStatus,
}

/// Transport security requested by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Encryption {
    /// Implicit TLS
    Ssl,
    /// Implicit TLS
    Tls,
    /// STARTTLS upgrade
    #[default]
    StartTls,
}

impl Encryption {
    /// Lenient parse: unknown or empty values fall back to STARTTLS.
    pub fn parse_lenient(value: &str) -> Self {
        value.trim().parse().unwrap_or_default()
    }
}

/// SMTP sending configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MailProvider {
    pub id: String,
    /// Sender address, also the lookup key.
    pub email: String,
    /// Display name used in the From header.
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub encryption: Encryption,
    pub status: LifecycleStatus,
}

impl MailProvider {
    /// Implicit TLS for `ssl`/`tls` or the SMTPS port, STARTTLS otherwise.
    pub fn implicit_tls(&self) -> bool {
        matches!(self.encryption, Encryption::Ssl | Encryption::Tls) || self.port == 465
    }
}

// ============================================================================
// Processing results
// ============================================================================

/// Rendered subject and body. Never persisted by the worker itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

/// Status of a mail job in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MailStatus {
    Pending,
    Sent,
    Failed,
}

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    pub job_id: String,
    pub status: MailStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl StatusEvent {
    pub fn new(job_id: impl Into<String>, status: MailStatus, message: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status,
            message: message.into(),
            created_at: Utc::now(),
        }
    }
}

/// What the history record is updated with after a send.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryUpdate {
    pub job_id: String,
    pub subject: String,
    pub body: String,
    pub recipients: Vec<String>,
    /// Job data serialized as JSON text.
    pub data: String,
    pub template_id: String,
    pub provider_email: String,
}
