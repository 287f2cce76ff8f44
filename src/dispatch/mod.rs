//! Action dispatch — one sender per channel, one log entry per attempt.
//!
//! Senders are registered in a lookup table keyed by channel, so adding a
//! channel never touches the routing engine. The dispatcher bounds every
//! attempt with a timeout and converts every outcome (success, error,
//! timeout, missing sender) into exactly one `DeliveryLogEntry`.

pub mod email;
pub mod pending;
pub mod telegram;
pub mod webhook;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{RelayConfig, RoutingConfig};
use crate::error::{ConfigError, DispatchError};
use crate::routing::model::{
    Action, ChannelKind, DeliveryLogEntry, DeliveryStatus, now, truncate_chars,
};

pub use email::EmailSender;
pub use pending::PendingProviderSender;
pub use telegram::TelegramSender;
pub use webhook::{DiscordSender, SlackSender, WebhookSender};

/// What a sender reports when an attempt did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The remote side confirmed receipt.
    Sent,
    /// Handed off without a delivery confirmation.
    Accepted { note: String },
}

/// Delivery capability for one channel.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Channel this sender is registered under.
    fn channel(&self) -> ChannelKind;

    /// Attempt a single delivery of `content` for `action`.
    async fn send(&self, action: &Action, content: &str) -> Result<DeliveryOutcome, DispatchError>;
}

/// Channel registry plus per-attempt policy (timeout, log truncation).
pub struct Dispatcher {
    senders: HashMap<ChannelKind, Arc<dyn ChannelSender>>,
    timeout: Duration,
    content_limit: usize,
}

impl Dispatcher {
    /// Create a dispatcher with no registered channels.
    pub fn new(config: &RoutingConfig) -> Self {
        Self {
            senders: HashMap::new(),
            timeout: config.dispatch_timeout,
            content_limit: config.log_content_limit,
        }
    }

    /// Create a dispatcher with every built-in channel registered.
    pub fn from_config(config: &RelayConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.routing.dispatch_timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        let channels = &config.channels;
        let mut dispatcher = Self::new(&config.routing);
        dispatcher.register(Arc::new(DiscordSender::new(
            client.clone(),
            channels.discord_username.clone(),
        )));
        dispatcher.register(Arc::new(SlackSender::new(client.clone())));
        dispatcher.register(Arc::new(WebhookSender::new(client.clone())));
        dispatcher.register(Arc::new(TelegramSender::new(
            client,
            channels.telegram_api_base.clone(),
            channels.telegram_bot_token.clone(),
        )));
        dispatcher.register(Arc::new(PendingProviderSender::new(ChannelKind::Sms)));
        match &channels.smtp {
            Some(smtp) => dispatcher.register(Arc::new(EmailSender::new(smtp.clone()))),
            None => dispatcher.register(Arc::new(PendingProviderSender::new(ChannelKind::Email))),
        }
        Ok(dispatcher)
    }

    /// Register (or replace) the sender for its channel.
    pub fn register(&mut self, sender: Arc<dyn ChannelSender>) {
        self.senders.insert(sender.channel(), sender);
    }

    /// Whether a sender is registered for `channel`.
    pub fn supports(&self, channel: ChannelKind) -> bool {
        self.senders.contains_key(&channel)
    }

    /// Attempt delivery of `content` via `action`. Never fails: errors become
    /// a `failed` entry.
    pub async fn dispatch(&self, action: &Action, content: &str, owner_id: &str) -> DeliveryLogEntry {
        let channel = action.channel();
        let result = match self.senders.get(&channel) {
            Some(sender) => match tokio::time::timeout(self.timeout, sender.send(action, content)).await {
                Ok(result) => result,
                Err(_) => Err(DispatchError::Timeout {
                    channel: channel.to_string(),
                    timeout: self.timeout,
                }),
            },
            None => Err(DispatchError::UnsupportedChannel(channel.to_string())),
        };

        let (status, error) = match result {
            Ok(DeliveryOutcome::Sent) => (DeliveryStatus::Sent, None),
            Ok(DeliveryOutcome::Accepted { note }) => (DeliveryStatus::Accepted, Some(note)),
            Err(e) => (DeliveryStatus::Failed, Some(e.to_string())),
        };

        match &error {
            Some(reason) if status == DeliveryStatus::Failed => warn!(
                owner_id,
                channel = %channel,
                destination = action.destination(),
                error = %reason,
                "Delivery failed"
            ),
            _ => info!(
                owner_id,
                channel = %channel,
                status = %status,
                "Delivery attempted"
            ),
        }

        DeliveryLogEntry {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            rule_id: None,
            channel,
            destination: action.destination().to_string(),
            content: truncate_chars(content, self.content_limit),
            status,
            error,
            created_at: now(),
        }
    }
}

/// Map a reqwest transport error to a dispatch error.
pub(crate) fn transport_error(channel: ChannelKind, err: reqwest::Error) -> DispatchError {
    DispatchError::Http {
        channel: channel.to_string(),
        reason: err.to_string(),
    }
}

/// `Sent` for 2xx responses, `Status` error otherwise.
pub(crate) fn check_response(
    channel: ChannelKind,
    response: &reqwest::Response,
) -> Result<DeliveryOutcome, DispatchError> {
    let status = response.status();
    if status.is_success() {
        Ok(DeliveryOutcome::Sent)
    } else {
        Err(DispatchError::Status {
            channel: channel.to_string(),
            status: status.as_u16(),
        })
    }
}

/// Error for an action handed to a sender registered for another channel.
pub(crate) fn wrong_sender(expected: ChannelKind, action: &Action) -> DispatchError {
    DispatchError::InvalidDestination {
        channel: expected.to_string(),
        reason: format!("{} action routed to {expected} sender", action.channel()),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{MockEndpoint, UNREACHABLE_URL};
    use super::*;

    fn routing_config(timeout: Duration) -> RoutingConfig {
        RoutingConfig {
            dispatch_timeout: timeout,
            log_content_limit: 10,
            strict_conditions: false,
        }
    }

    fn dispatcher(timeout: Duration) -> Dispatcher {
        let mut d = Dispatcher::new(&routing_config(timeout));
        let client = reqwest::Client::new();
        d.register(Arc::new(SlackSender::new(client)));
        d.register(Arc::new(PendingProviderSender::new(ChannelKind::Sms)));
        d
    }

    #[tokio::test]
    async fn success_produces_sent_entry() {
        let endpoint = MockEndpoint::start(200).await;
        let d = dispatcher(Duration::from_secs(5));
        let entry = d
            .dispatch(&Action::slack(endpoint.url("/x")), "hello team", "user-1")
            .await;
        assert_eq!(entry.status, DeliveryStatus::Sent);
        assert_eq!(entry.channel, ChannelKind::Slack);
        assert_eq!(entry.owner_id, "user-1");
        assert!(entry.error.is_none());
        assert_eq!(endpoint.requests().len(), 1);
    }

    #[tokio::test]
    async fn non_2xx_produces_failed_entry_with_status() {
        let endpoint = MockEndpoint::start(500).await;
        let d = dispatcher(Duration::from_secs(5));
        let entry = d
            .dispatch(&Action::slack(endpoint.url("/x")), "hello", "user-1")
            .await;
        assert_eq!(entry.status, DeliveryStatus::Failed);
        assert!(entry.error.unwrap().contains("500"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_produces_failed_entry() {
        let d = dispatcher(Duration::from_secs(5));
        let entry = d
            .dispatch(&Action::slack(UNREACHABLE_URL), "hello", "user-1")
            .await;
        assert_eq!(entry.status, DeliveryStatus::Failed);
        assert!(!entry.error.unwrap().is_empty());
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let endpoint = MockEndpoint::start_with_delay(200, Duration::from_secs(3)).await;
        let d = dispatcher(Duration::from_millis(200));
        let entry = d
            .dispatch(&Action::slack(endpoint.url("/slow")), "hello", "user-1")
            .await;
        assert_eq!(entry.status, DeliveryStatus::Failed);
        assert!(entry.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn unregistered_channel_is_unsupported() {
        let d = dispatcher(Duration::from_secs(5));
        assert!(!d.supports(ChannelKind::Discord));
        let entry = d
            .dispatch(&Action::discord("https://discord.test/hook"), "hello", "user-1")
            .await;
        assert_eq!(entry.status, DeliveryStatus::Failed);
        assert!(entry.error.unwrap().contains("not supported"));
    }

    #[tokio::test]
    async fn sms_is_accepted_not_sent() {
        let d = dispatcher(Duration::from_secs(5));
        let entry = d.dispatch(&Action::sms("+15550100"), "hello", "user-1").await;
        assert_eq!(entry.status, DeliveryStatus::Accepted);
        assert!(entry.error.unwrap().contains("provider integration pending"));
    }

    #[tokio::test]
    async fn content_is_truncated_in_log() {
        let d = dispatcher(Duration::from_secs(5));
        let entry = d
            .dispatch(&Action::sms("+15550100"), "a very long message body", "user-1")
            .await;
        assert_eq!(entry.content, "a very lon");
    }

    #[test]
    fn from_config_registers_every_channel() {
        let d = Dispatcher::from_config(&RelayConfig::default()).unwrap();
        for channel in ChannelKind::ALL {
            assert!(d.supports(channel), "{channel} should be registered");
        }
    }
}
