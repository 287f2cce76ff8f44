//! Email channel — SMTP via lettre.
//!
//! Registered only when SMTP is configured; otherwise email actions go to
//! the pending-provider sender.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;

use super::{ChannelSender, DeliveryOutcome, wrong_sender};
use crate::config::SmtpConfig;
use crate::error::DispatchError;
use crate::routing::model::{Action, ChannelKind};

const DEFAULT_SUBJECT: &str = "Message from ARIA";

/// Sends routed content as a plain-text email.
pub struct EmailSender {
    config: SmtpConfig,
}

impl EmailSender {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, to: &str, subject: &str, body: &str) -> Result<Message, DispatchError> {
        let from: Mailbox = self
            .config
            .from_address
            .parse()
            .map_err(|e| invalid("from address", e))?;
        let to: Mailbox = to.parse().map_err(|e| invalid("to address", e))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| invalid("message", e))
    }

    /// SMTP login, or `None` for relays that accept mail without AUTH.
    fn credentials(&self) -> Option<Credentials> {
        let username = self.config.username.trim();
        if username.is_empty() {
            return None;
        }
        Some(Credentials::new(
            username.to_string(),
            self.config.password.expose_secret().to_string(),
        ))
    }

    fn transport(&self) -> Result<SmtpTransport, DispatchError> {
        let mut builder = SmtpTransport::relay(&self.config.host)
            .map_err(|e| DispatchError::Http {
                channel: "email".into(),
                reason: format!("SMTP relay error: {e}"),
            })?
            .port(self.config.port);
        if let Some(creds) = self.credentials() {
            builder = builder.credentials(creds);
        }
        Ok(builder.build())
    }
}

fn invalid(what: &str, err: impl std::fmt::Display) -> DispatchError {
    DispatchError::InvalidDestination {
        channel: "email".into(),
        reason: format!("invalid {what}: {err}"),
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn channel(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send(&self, action: &Action, content: &str) -> Result<DeliveryOutcome, DispatchError> {
        let Action::Email {
            destination,
            subject,
        } = action
        else {
            return Err(wrong_sender(self.channel(), action));
        };

        let message = self.build_message(
            destination,
            subject.as_deref().unwrap_or(DEFAULT_SUBJECT),
            content,
        )?;

        let transport = self.transport()?;

        // lettre's SmtpTransport is blocking.
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| DispatchError::Http {
                channel: "email".into(),
                reason: format!("SMTP task failed: {e}"),
            })?
            .map_err(|e| DispatchError::Http {
                channel: "email".into(),
                reason: format!("SMTP send failed: {e}"),
            })?;

        Ok(DeliveryOutcome::Sent)
    }
}
