//! Telegram channel — `sendMessage` via the Bot API.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::{ChannelSender, DeliveryOutcome, check_response, transport_error, wrong_sender};
use crate::error::DispatchError;
use crate::routing::model::{Action, ChannelKind, truncate_chars};

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Delivers to a Telegram chat id in a single `sendMessage` call.
pub struct TelegramSender {
    client: reqwest::Client,
    api_base: String,
    default_token: Option<SecretString>,
}

impl TelegramSender {
    pub fn new(
        client: reqwest::Client,
        api_base: String,
        default_token: Option<SecretString>,
    ) -> Self {
        Self {
            client,
            api_base,
            default_token,
        }
    }

    fn api_url(&self, token: &str, method: &str) -> String {
        format!("{}/bot{token}/{method}", self.api_base)
    }

    async fn send_message(&self, token: &str, chat_id: &str, text: &str) -> Result<(), DispatchError> {
        let response = self
            .client
            .post(self.api_url(token, "sendMessage"))
            .json(&serde_json::json!({
                "chat_id": chat_id,
                "text": text,
            }))
            .send()
            .await
            .map_err(|e| transport_error(ChannelKind::Telegram, e))?;
        check_response(ChannelKind::Telegram, &response).map(|_| ())
    }
}

#[async_trait]
impl ChannelSender for TelegramSender {
    fn channel(&self) -> ChannelKind {
        ChannelKind::Telegram
    }

    async fn send(&self, action: &Action, content: &str) -> Result<DeliveryOutcome, DispatchError> {
        let Action::Telegram {
            destination,
            bot_token,
        } = action
        else {
            return Err(wrong_sender(self.channel(), action));
        };

        let token = match (bot_token.as_deref(), &self.default_token) {
            (Some(token), _) if !token.trim().is_empty() => token,
            (_, Some(default)) => default.expose_secret(),
            _ => {
                return Err(DispatchError::MissingCredentials {
                    channel: "telegram".into(),
                    what: "bot token".into(),
                });
            }
        };

        let text = truncate_chars(content, TELEGRAM_MAX_MESSAGE_LENGTH);
        self.send_message(token, destination, &text).await?;
        Ok(DeliveryOutcome::Sent)
    }
}
