//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default number of characters of routed content kept in a delivery log entry.
pub const DEFAULT_LOG_CONTENT_LIMIT: usize = 1000;

/// Relay configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Path of the libSQL database file.
    pub db_path: PathBuf,
    /// Port for the HTTP API.
    pub port: u16,
    /// Routing engine behaviour.
    pub routing: RoutingConfig,
    /// Outbound channel settings.
    pub channels: ChannelConfig,
}

/// Settings that change how rules are evaluated and dispatched.
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    /// Upper bound for a single dispatch call.
    pub dispatch_timeout: Duration,
    /// Characters of content kept per delivery log entry.
    pub log_content_limit: usize,
    /// Unknown condition types fail the rule instead of passing.
    pub strict_conditions: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            dispatch_timeout: Duration::from_secs(5),
            log_content_limit: DEFAULT_LOG_CONTENT_LIMIT,
            strict_conditions: false,
        }
    }
}

/// Credentials and endpoints for outbound channels.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Display name used for Discord webhook posts.
    pub discord_username: String,
    /// Deployment-wide Telegram bot token (actions may carry their own).
    pub telegram_bot_token: Option<SecretString>,
    /// Telegram Bot API base URL.
    pub telegram_api_base: String,
    /// SMTP settings; `None` leaves email in pending-provider mode.
    pub smtp: Option<SmtpConfig>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            discord_username: "ARIA".to_string(),
            telegram_bot_token: None,
            telegram_api_base: "https://api.telegram.org".to_string(),
            smtp: None,
        }
    }
}

/// Outbound SMTP settings for the email channel.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/aria.db"),
            port: 8080,
            routing: RoutingConfig::default(),
            channels: ChannelConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Build config from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Unset keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let db_path = lookup("ARIA_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);
        let port = parse_or(&lookup, "ARIA_PORT", defaults.port)?;

        let timeout_secs: u64 = parse_or(
            &lookup,
            "ARIA_DISPATCH_TIMEOUT_SECS",
            defaults.routing.dispatch_timeout.as_secs(),
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ARIA_DISPATCH_TIMEOUT_SECS".into(),
                message: "must be at least 1 second".into(),
            });
        }

        let routing = RoutingConfig {
            dispatch_timeout: Duration::from_secs(timeout_secs),
            log_content_limit: parse_or(
                &lookup,
                "ARIA_LOG_CONTENT_LIMIT",
                defaults.routing.log_content_limit,
            )?,
            strict_conditions: parse_bool(&lookup, "ARIA_STRICT_CONDITIONS")?.unwrap_or(false),
        };

        let smtp = match lookup("ARIA_SMTP_HOST") {
            Some(host) => {
                let username = lookup("ARIA_SMTP_USERNAME").unwrap_or_default();
                Some(SmtpConfig {
                    port: parse_or(&lookup, "ARIA_SMTP_PORT", 587)?,
                    password: SecretString::from(lookup("ARIA_SMTP_PASSWORD").unwrap_or_default()),
                    from_address: lookup("ARIA_SMTP_FROM").unwrap_or_else(|| username.clone()),
                    username,
                    host,
                })
            }
            None => None,
        };

        let channels = ChannelConfig {
            discord_username: lookup("ARIA_DISCORD_USERNAME")
                .unwrap_or(defaults.channels.discord_username),
            telegram_bot_token: lookup("TELEGRAM_BOT_TOKEN")
                .filter(|t| !t.trim().is_empty())
                .map(SecretString::from),
            telegram_api_base: lookup("TELEGRAM_API_BASE")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(defaults.channels.telegram_api_base),
            smtp,
        };

        Ok(Self {
            db_path,
            port,
            routing,
            channels,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_bool<F>(lookup: &F, key: &str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|s| s.trim().to_ascii_lowercase()) {
        None => Ok(None),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            other => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected a boolean, got '{other}'"),
            }),
        },
    }
}
