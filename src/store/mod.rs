//! Persistence layer — libSQL-backed storage for routing rules and delivery logs.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::Database;
