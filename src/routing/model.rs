//! Core types for routing rules and delivery logs.
//!
//! A routing rule is a named, user-owned set of conditions and actions.
//! Every enabled rule whose conditions all pass fires all of its actions;
//! each attempted action leaves exactly one delivery log entry behind.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RoutingError;

/// Maximum length of a rule name.
const MAX_RULE_NAME_LENGTH: usize = 200;

/// Stand-in for per-action secrets in responses. Sending it back on update
/// keeps the stored value.
pub const REDACTED_SECRET: &str = "********";

/// A routing rule owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    /// Only affects result ordering; every enabled rule is evaluated.
    pub priority: i64,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RoutingRule {
    /// Copy of the rule with per-action secrets masked, for API responses.
    pub fn redacted(mut self) -> Self {
        for action in &mut self.actions {
            if let Action::Telegram {
                bot_token: Some(token),
                ..
            } = action
            {
                *token = REDACTED_SECRET.to_string();
            }
        }
        self
    }
}

// ── Conditions ──────────────────────────────────────────────────────

/// A predicate over inbound text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: ConditionKind,
    #[serde(default)]
    pub value: String,
}

impl Condition {
    pub fn new(kind: ConditionKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn contains(value: impl Into<String>) -> Self {
        Self::new(ConditionKind::Contains, value)
    }

    pub fn starts_with(value: impl Into<String>) -> Self {
        Self::new(ConditionKind::StartsWith, value)
    }

    pub fn keyword(value: impl Into<String>) -> Self {
        Self::new(ConditionKind::Keyword, value)
    }
}

/// Condition type tag.
///
/// Unrecognized tags are kept as `Other` so stored rules survive a
/// round-trip through the database unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConditionKind {
    Contains,
    StartsWith,
    Keyword,
    Sentiment,
    TimeOfDay,
    Other(String),
}

impl ConditionKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::Keyword => "keyword",
            Self::Sentiment => "sentiment",
            Self::TimeOfDay => "time_of_day",
            Self::Other(tag) => tag,
        }
    }

    /// Whether the tag is one the rule store accepts on create/update.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<String> for ConditionKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "contains" => Self::Contains,
            "starts_with" => Self::StartsWith,
            "keyword" => Self::Keyword,
            "sentiment" => Self::Sentiment,
            "time_of_day" => Self::TimeOfDay,
            _ => Self::Other(tag),
        }
    }
}

impl From<ConditionKind> for String {
    fn from(kind: ConditionKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Actions ─────────────────────────────────────────────────────────

/// External messaging surface an action delivers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Discord,
    Telegram,
    Sms,
    Email,
    Slack,
    Webhook,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 6] = [
        Self::Discord,
        Self::Telegram,
        Self::Sms,
        Self::Email,
        Self::Slack,
        Self::Webhook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discord => "discord",
            Self::Telegram => "telegram",
            Self::Sms => "sms",
            Self::Email => "email",
            Self::Slack => "slack",
            Self::Webhook => "webhook",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown channel: {s}"))
    }
}

/// HTTP method for generic webhook actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WebhookMethod {
    #[serde(alias = "get")]
    Get,
    #[default]
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "put")]
    Put,
    #[serde(alias = "patch")]
    Patch,
    #[serde(alias = "delete")]
    Delete,
}

/// A single forwarding instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum Action {
    /// Discord webhook URL.
    Discord { destination: String },
    /// Telegram chat id. The bot token falls back to the deployment's token.
    Telegram {
        destination: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bot_token: Option<String>,
    },
    /// Phone number.
    Sms { destination: String },
    /// Email address.
    Email {
        destination: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subject: Option<String>,
    },
    /// Slack incoming-webhook URL.
    Slack { destination: String },
    /// Arbitrary URL with caller-specified method, headers and body.
    ///
    /// String leaves of `body` have `{{content}}` replaced with the routed text.
    Webhook {
        destination: String,
        #[serde(default)]
        method: WebhookMethod,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<serde_json::Value>,
    },
}

impl Action {
    pub fn channel(&self) -> ChannelKind {
        match self {
            Self::Discord { .. } => ChannelKind::Discord,
            Self::Telegram { .. } => ChannelKind::Telegram,
            Self::Sms { .. } => ChannelKind::Sms,
            Self::Email { .. } => ChannelKind::Email,
            Self::Slack { .. } => ChannelKind::Slack,
            Self::Webhook { .. } => ChannelKind::Webhook,
        }
    }

    pub fn destination(&self) -> &str {
        match self {
            Self::Discord { destination }
            | Self::Telegram { destination, .. }
            | Self::Sms { destination }
            | Self::Email { destination, .. }
            | Self::Slack { destination }
            | Self::Webhook { destination, .. } => destination,
        }
    }

    pub fn slack(destination: impl Into<String>) -> Self {
        Self::Slack {
            destination: destination.into(),
        }
    }

    pub fn discord(destination: impl Into<String>) -> Self {
        Self::Discord {
            destination: destination.into(),
        }
    }

    pub fn sms(destination: impl Into<String>) -> Self {
        Self::Sms {
            destination: destination.into(),
        }
    }

    pub fn webhook(destination: impl Into<String>) -> Self {
        Self::Webhook {
            destination: destination.into(),
            method: WebhookMethod::Post,
            headers: BTreeMap::new(),
            body: None,
        }
    }

    fn validate(&self, index: usize) -> Result<(), RoutingError> {
        let field = format!("actions[{index}].destination");
        let destination = self.destination().trim();
        if destination.is_empty() {
            return Err(RoutingError::validation(field, "must not be empty"));
        }
        match self {
            Self::Discord { .. } | Self::Slack { .. } | Self::Webhook { .. } => {
                let url = reqwest::Url::parse(destination)
                    .map_err(|e| RoutingError::validation(&field, format!("invalid URL: {e}")))?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(RoutingError::validation(field, "URL must use http or https"));
                }
            }
            Self::Email { .. } if !destination.contains('@') => {
                return Err(RoutingError::validation(field, "not an email address"));
            }
            _ => {}
        }
        Ok(())
    }
}

// ── Rule drafts ─────────────────────────────────────────────────────

fn default_enabled() -> bool {
    true
}

/// User-supplied rule definition for create and update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDraft {
    pub name: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub priority: i64,
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
}

impl RuleDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            conditions: Vec::new(),
            actions: Vec::new(),
            priority: 0,
            is_enabled: true,
        }
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.is_enabled = enabled;
        self
    }

    /// Check name, condition type membership and action destinations.
    pub fn validate(&self) -> Result<(), RoutingError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(RoutingError::validation("name", "must not be empty"));
        }
        if name.chars().count() > MAX_RULE_NAME_LENGTH {
            return Err(RoutingError::validation(
                "name",
                format!("must be at most {MAX_RULE_NAME_LENGTH} characters"),
            ));
        }

        for (i, condition) in self.conditions.iter().enumerate() {
            if !condition.kind.is_known() {
                return Err(RoutingError::validation(
                    format!("conditions[{i}].type"),
                    format!("unknown condition type '{}'", condition.kind),
                ));
            }
            let needs_value = matches!(
                condition.kind,
                ConditionKind::Contains | ConditionKind::StartsWith | ConditionKind::Keyword
            );
            if needs_value && condition.value.trim().is_empty() {
                return Err(RoutingError::validation(
                    format!("conditions[{i}].value"),
                    "must not be empty",
                ));
            }
        }

        for (i, action) in self.actions.iter().enumerate() {
            action.validate(i)?;
        }
        Ok(())
    }

    /// Validate and turn the draft into a new rule owned by `owner_id`.
    pub fn into_rule(mut self, owner_id: &str) -> Result<RoutingRule, RoutingError> {
        self.validate()?;
        restore_secrets(&mut self.actions, &[]);
        let created = now();
        Ok(RoutingRule {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            name: self.name.trim().to_string(),
            conditions: self.conditions,
            actions: self.actions,
            priority: self.priority,
            is_enabled: self.is_enabled,
            created_at: created,
            updated_at: created,
        })
    }

    /// Validate and overwrite the user-editable fields of `rule`.
    pub fn apply_to(mut self, rule: &mut RoutingRule) -> Result<(), RoutingError> {
        self.validate()?;
        restore_secrets(&mut self.actions, &rule.actions);
        rule.name = self.name.trim().to_string();
        rule.conditions = self.conditions;
        rule.actions = self.actions;
        rule.priority = self.priority;
        rule.is_enabled = self.is_enabled;
        rule.updated_at = now();
        Ok(())
    }
}

/// Replace masked Telegram tokens with the token stored at the same
/// position, or drop them when there is none.
fn restore_secrets(actions: &mut [Action], previous: &[Action]) {
    for (i, action) in actions.iter_mut().enumerate() {
        let Action::Telegram { bot_token, .. } = action else {
            continue;
        };
        if bot_token.as_deref() != Some(REDACTED_SECRET) {
            continue;
        }
        *bot_token = match previous.get(i) {
            Some(Action::Telegram { bot_token: stored, .. }) => stored.clone(),
            _ => None,
        };
    }
}

// ── Delivery logs ───────────────────────────────────────────────────

/// Outcome of one dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// The channel confirmed receipt (2xx, SMTP accept).
    Sent,
    /// The attempt failed; `error` says why.
    Failed,
    /// Handed to a provider integration that does not confirm delivery.
    Accepted,
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent => write!(f, "sent"),
            Self::Failed => write!(f, "failed"),
            Self::Accepted => write!(f, "accepted"),
        }
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            "accepted" => Ok(Self::Accepted),
            other => Err(format!("unknown delivery status: {other}")),
        }
    }
}

/// Immutable record of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryLogEntry {
    pub id: Uuid,
    pub owner_id: String,
    pub rule_id: Option<Uuid>,
    pub channel: ChannelKind,
    pub destination: String,
    /// Routed content, truncated to the configured limit.
    pub content: String,
    pub status: DeliveryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Result of one routing pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryReport {
    /// Rules that matched, in the order they fired.
    pub matched_rules: Vec<Uuid>,
    /// One entry per attempted action, in rule order then action order.
    pub deliveries: Vec<DeliveryLogEntry>,
}

impl DeliveryReport {
    pub fn count(&self, status: DeliveryStatus) -> usize {
        self.deliveries.iter().filter(|d| d.status == status).count()
    }
}

/// Current time at the microsecond precision the store keeps.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Truncate to at most `limit` characters on a char boundary.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
