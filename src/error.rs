//! Error types for the ARIA relay.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type for the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Request-level errors that abort a routing or rule operation.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Rule {id} not found")]
    NotFound { id: Uuid },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl RoutingError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A single delivery attempt failed. Never surfaced to callers directly;
/// the dispatcher turns it into a `failed` log entry.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("HTTP request to {channel} failed: {reason}")]
    Http { channel: String, reason: String },

    #[error("{channel} responded with HTTP {status}")]
    Status { channel: String, status: u16 },

    #[error("Missing credentials for {channel}: {what}")]
    MissingCredentials { channel: String, what: String },

    #[error("Channel {0} is not supported by this deployment")]
    UnsupportedChannel(String),

    #[error("Invalid destination for {channel}: {reason}")]
    InvalidDestination { channel: String, reason: String },

    #[error("Delivery via {channel} timed out after {timeout:?}")]
    Timeout { channel: String, timeout: Duration },
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
