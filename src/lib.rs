//! ARIA relay — rule-based routing of assistant output to external channels.

pub mod api;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod routing;
pub mod store;
