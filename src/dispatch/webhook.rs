//! Webhook-style channels: Discord, Slack, and generic HTTP webhooks.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Value, json};

use super::{ChannelSender, DeliveryOutcome, check_response, transport_error, wrong_sender};
use crate::error::DispatchError;
use crate::routing::model::{Action, ChannelKind, WebhookMethod};

/// Placeholder replaced with the routed content in webhook body templates.
const CONTENT_PLACEHOLDER: &str = "{{content}}";

/// Posts `{content, username}` to a Discord webhook URL.
pub struct DiscordSender {
    client: reqwest::Client,
    username: String,
}

impl DiscordSender {
    pub fn new(client: reqwest::Client, username: String) -> Self {
        Self { client, username }
    }
}

#[async_trait]
impl ChannelSender for DiscordSender {
    fn channel(&self) -> ChannelKind {
        ChannelKind::Discord
    }

    async fn send(&self, action: &Action, content: &str) -> Result<DeliveryOutcome, DispatchError> {
        let Action::Discord { destination } = action else {
            return Err(wrong_sender(self.channel(), action));
        };
        let response = self
            .client
            .post(destination)
            .json(&json!({
                "content": content,
                "username": self.username,
            }))
            .send()
            .await
            .map_err(|e| transport_error(self.channel(), e))?;
        check_response(self.channel(), &response)
    }
}

/// Posts `{text}` to a Slack incoming-webhook URL.
pub struct SlackSender {
    client: reqwest::Client,
}

impl SlackSender {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChannelSender for SlackSender {
    fn channel(&self) -> ChannelKind {
        ChannelKind::Slack
    }

    async fn send(&self, action: &Action, content: &str) -> Result<DeliveryOutcome, DispatchError> {
        let Action::Slack { destination } = action else {
            return Err(wrong_sender(self.channel(), action));
        };
        let response = self
            .client
            .post(destination)
            .json(&json!({ "text": content }))
            .send()
            .await
            .map_err(|e| transport_error(self.channel(), e))?;
        check_response(self.channel(), &response)
    }
}

/// Generic webhook with caller-specified method, headers and body.
pub struct WebhookSender {
    client: reqwest::Client,
}

impl WebhookSender {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChannelSender for WebhookSender {
    fn channel(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    async fn send(&self, action: &Action, content: &str) -> Result<DeliveryOutcome, DispatchError> {
        let Action::Webhook {
            destination,
            method,
            headers,
            body,
        } = action
        else {
            return Err(wrong_sender(self.channel(), action));
        };

        let mut request = self.client.request(to_http_method(*method), destination);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        // GET requests carry no body.
        if *method != WebhookMethod::Get {
            let payload = match body {
                Some(template) => render_body(template, content),
                None => json!({ "content": content }),
            };
            request = request.json(&payload);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(self.channel(), e))?;
        check_response(self.channel(), &response)
    }
}

fn to_http_method(method: WebhookMethod) -> Method {
    match method {
        WebhookMethod::Get => Method::GET,
        WebhookMethod::Post => Method::POST,
        WebhookMethod::Put => Method::PUT,
        WebhookMethod::Patch => Method::PATCH,
        WebhookMethod::Delete => Method::DELETE,
    }
}

/// Replace `{{content}}` in every string leaf of `template`.
fn render_body(template: &Value, content: &str) -> Value {
    match template {
        Value::String(s) => Value::String(s.replace(CONTENT_PLACEHOLDER, content)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_body(v, content)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_body(v, content)))
                .collect(),
        ),
        other => other.clone(),
    }
}
