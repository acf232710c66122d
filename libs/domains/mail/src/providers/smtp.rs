//! SMTP transport using lettre.
//!
//! A transport is built per delivery from the job's provider settings, so
//! one `SmtpTransport` serves every provider.

use super::{MailTransport, OutgoingMail, TransportSettings};
use crate::error::{MailError, MailResult};
use async_trait::async_trait;
use lettre::{
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::{Credentials, Mechanism},
    transport::smtp::client::{Tls, TlsParameters},
};
use tracing::{error, info};

/// SMTP delivery over implicit TLS or mandatory STARTTLS.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmtpTransport;

impl SmtpTransport {
    pub fn new() -> Self {
        Self
    }

    fn build_transport(
        settings: &TransportSettings,
    ) -> MailResult<AsyncSmtpTransport<Tokio1Executor>> {
        let tls_parameters = TlsParameters::builder(settings.host.clone())
            .dangerous_accept_invalid_certs(settings.skip_tls_verify)
            .build()
            .map_err(|e| MailError::SendFailed(format!("Invalid TLS parameters: {}", e)))?;

        let tls = if settings.implicit_tls {
            Tls::Wrapper(tls_parameters)
        } else {
            Tls::Required(tls_parameters)
        };

        Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
            .port(settings.port)
            .tls(tls)
            .credentials(Credentials::new(settings.username.clone(), settings.password.clone()))
            .authentication(vec![Mechanism::Plain])
            .timeout(Some(settings.timeout))
            .build())
    }

    fn build_message(settings: &TransportSettings, mail: &OutgoingMail) -> MailResult<Message> {
        let address: Address = settings
            .from_email
            .parse()
            .map_err(|e| MailError::SendFailed(format!("Invalid from address: {}", e)))?;
        let name = Some(settings.from_name.clone()).filter(|name| !name.is_empty());
        let from = Mailbox::new(name, address);

        let mut builder = Message::builder()
            .from(from)
            .subject(&mail.subject)
            .header(ContentType::TEXT_HTML)
            .date_now();

        for recipient in &mail.recipients {
            let to: Mailbox = recipient.parse().map_err(|e| {
                MailError::SendFailed(format!("Invalid to address '{}': {}", recipient, e))
            })?;
            builder = builder.to(to);
        }

        builder
            .body(mail.body.clone())
            .map_err(|e| MailError::SendFailed(format!("Failed to build email message: {}", e)))
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn deliver(&self, settings: &TransportSettings, mail: &OutgoingMail) -> MailResult<()> {
        let message = Self::build_message(settings, mail)?;
        let transport = Self::build_transport(settings)?;

        let response = transport.send(message).await.map_err(|e| {
            error!(host = %settings.host, error = %e, "Failed to send email via SMTP");
            MailError::SendFailed(format!("SMTP send failed: {}", e))
        })?;

        let message_id = response.message().next().map(|s| s.to_string());
        info!(
            host = %settings.host,
            recipients = mail.recipients.len(),
            message_id = ?message_id,
            "Email sent via SMTP"
        );

        Ok(())
    }

    fn name(&self) -> &'static str {
        "SMTP"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use std::time::Duration;

    fn settings() -> TransportSettings {
        TransportSettings {
            host: "smtp.example.com".into(),
            port: 587,
            username: "user".into(),
            password: "secret".into(),
            from_email: "no@x.com".into(),
            from_name: "No Reply".into(),
            implicit_tls: false,
            skip_tls_verify: true,
            timeout: Duration::from_secs(5),
        }
    }

    fn mail(recipients: &[&str]) -> OutgoingMail {
        OutgoingMail {
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
            subject: "Hi Ann".into(),
            body: "<p>Hello Ann!</p>".into(),
            data: Map::new(),
        }
    }

    #[test]
    fn test_build_message_headers() {
        let message =
            SmtpTransport::build_message(&settings(), &mail(&["a@b.com", "c@d.com"])).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(
            raw.contains("From: \"No Reply\" <no@x.com>")
                || raw.contains("From: No Reply <no@x.com>")
        );
        assert!(raw.contains("a@b.com"));
        assert!(raw.contains("c@d.com"));
        assert!(raw.contains("Subject: Hi Ann"));
        assert!(raw.contains("Content-Type: text/html; charset=utf-8"));
        assert!(raw.contains("Date: "));
    }

    #[test]
    fn test_display_name_with_comma_is_quoted() {
        let settings = TransportSettings {
            from_name: "Acme, Inc.".into(),
            ..settings()
        };

        let message = SmtpTransport::build_message(&settings, &mail(&["a@b.com"])).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        let from_line = raw.lines().find(|line| line.starts_with("From: ")).unwrap();
        let from: Mailbox = from_line.trim_start_matches("From: ").parse().unwrap();
        assert_eq!(from.name.as_deref(), Some("Acme, Inc."));
        assert_eq!(from.email.to_string(), "no@x.com");
    }

    #[test]
    fn test_empty_display_name_is_bare_address() {
        let settings = TransportSettings {
            from_name: String::new(),
            ..settings()
        };

        let message = SmtpTransport::build_message(&settings, &mail(&["a@b.com"])).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("From: no@x.com"));
    }

    #[test]
    fn test_invalid_from_address_is_send_failure() {
        let settings = TransportSettings {
            from_email: "not an address".into(),
            ..settings()
        };

        let err = SmtpTransport::build_message(&settings, &mail(&["a@b.com"])).unwrap_err();
        assert!(matches!(
            err,
            MailError::SendFailed(ref msg) if msg.contains("Invalid from address")
        ));
    }

    #[test]
    fn test_empty_recipients_fail_to_build() {
        let err = SmtpTransport::build_message(&settings(), &mail(&[])).unwrap_err();
        assert!(matches!(err, MailError::SendFailed(_)));
    }

    #[test]
    fn test_invalid_recipient_is_send_failure() {
        let err =
            SmtpTransport::build_message(&settings(), &mail(&["not an address"])).unwrap_err();
        assert!(matches!(err, MailError::SendFailed(_)));
    }

    #[test]
    fn test_build_transport_for_both_tls_modes() {
        assert!(SmtpTransport::build_transport(&settings()).is_ok());
        let wrapper = TransportSettings {
            implicit_tls: true,
            port: 465,
            ..settings()
        };
        assert!(SmtpTransport::build_transport(&wrapper).is_ok());
    }
}
