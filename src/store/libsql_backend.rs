//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Conditions and actions are
//! stored as JSON text; timestamps as RFC 3339 with microseconds so that
//! lexical order matches chronological order.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::routing::model::{DeliveryLogEntry, RoutingRule};
use crate::store::migrations;
use crate::store::traits::Database;

/// Column order shared by every rule query; `row_to_rule` depends on it.
const RULE_COLUMNS: &str =
    "id, owner_id, name, conditions, actions, priority, is_enabled, created_at, updated_at";

/// Deterministic rule order: priority first, then creation, then id.
const RULE_ORDER: &str = "ORDER BY priority DESC, created_at ASC, id ASC";

const LOG_COLUMNS: &str =
    "id, owner_id, rule_id, channel, destination, content, status, error, created_at";

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn query_rules(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
        context: &str,
    ) -> Result<Vec<RoutingRule>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{context}: {e}")))?;

        let mut rules = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{context}: {e}")))?
        {
            match row_to_rule(&row) {
                Ok(rule) => rules.push(rule),
                Err(e) => tracing::warn!("Skipping routing rule row: {e}"),
            }
        }
        Ok(rules)
    }
}

// ── Helper functions ────────────────────────────────────────────────

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn opt_text(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    s.parse()
        .map_err(|e| DatabaseError::Serialization(format!("invalid uuid '{s}': {e}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, DatabaseError> {
    serde_json::from_str(s).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

/// Map a libsql Row to a RoutingRule. Column order matches RULE_COLUMNS.
fn row_to_rule(row: &libsql::Row) -> Result<RoutingRule, DatabaseError> {
    let get_text = |idx: i32| {
        row.get::<String>(idx)
            .map_err(|e| DatabaseError::Serialization(format!("column {idx}: {e}")))
    };

    Ok(RoutingRule {
        id: parse_uuid(&get_text(0)?)?,
        owner_id: get_text(1)?,
        name: get_text(2)?,
        conditions: from_json(&get_text(3)?)?,
        actions: from_json(&get_text(4)?)?,
        priority: row.get::<i64>(5).unwrap_or(0),
        is_enabled: row.get::<i64>(6).unwrap_or(0) != 0,
        created_at: parse_datetime(&get_text(7)?),
        updated_at: parse_datetime(&get_text(8)?),
    })
}

/// Map a libsql Row to a DeliveryLogEntry. Column order matches LOG_COLUMNS.
fn row_to_log(row: &libsql::Row) -> Result<DeliveryLogEntry, DatabaseError> {
    let get_text = |idx: i32| {
        row.get::<String>(idx)
            .map_err(|e| DatabaseError::Serialization(format!("column {idx}: {e}")))
    };

    let rule_id = match row.get::<String>(2).ok() {
        Some(s) => Some(parse_uuid(&s)?),
        None => None,
    };

    Ok(DeliveryLogEntry {
        id: parse_uuid(&get_text(0)?)?,
        owner_id: get_text(1)?,
        rule_id,
        channel: get_text(3)?.parse().map_err(DatabaseError::Serialization)?,
        destination: get_text(4)?,
        content: get_text(5)?,
        status: get_text(6)?.parse().map_err(DatabaseError::Serialization)?,
        error: row.get::<String>(7).ok(),
        created_at: parse_datetime(&get_text(8)?),
    })
}

// ── Database trait implementation ───────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Rules ───────────────────────────────────────────────────────

    async fn create_rule(&self, rule: &RoutingRule) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO routing_rules ({RULE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                params![
                    rule.id.to_string(),
                    rule.owner_id.clone(),
                    rule.name.clone(),
                    to_json(&rule.conditions)?,
                    to_json(&rule.actions)?,
                    rule.priority,
                    rule.is_enabled as i64,
                    format_datetime(&rule.created_at),
                    format_datetime(&rule.updated_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_rule: {e}")))?;

        debug!(rule_id = %rule.id, owner_id = %rule.owner_id, "Routing rule created");
        Ok(())
    }

    async fn get_rule(
        &self,
        id: Uuid,
        owner_id: &str,
    ) -> Result<Option<RoutingRule>, DatabaseError> {
        let rules = self
            .query_rules(
                &format!("SELECT {RULE_COLUMNS} FROM routing_rules WHERE id = ?1 AND owner_id = ?2"),
                params![id.to_string(), owner_id],
                "get_rule",
            )
            .await?;
        Ok(rules.into_iter().next())
    }

    async fn list_rules(&self, owner_id: &str) -> Result<Vec<RoutingRule>, DatabaseError> {
        self.query_rules(
            &format!("SELECT {RULE_COLUMNS} FROM routing_rules WHERE owner_id = ?1 {RULE_ORDER}"),
            params![owner_id],
            "list_rules",
        )
        .await
    }

    async fn list_enabled_rules(&self, owner_id: &str) -> Result<Vec<RoutingRule>, DatabaseError> {
        self.query_rules(
            &format!(
                "SELECT {RULE_COLUMNS} FROM routing_rules WHERE owner_id = ?1 AND is_enabled = 1 {RULE_ORDER}"
            ),
            params![owner_id],
            "list_enabled_rules",
        )
        .await
    }

    async fn update_rule(&self, rule: &RoutingRule) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE routing_rules SET name=?1, conditions=?2, actions=?3, priority=?4, is_enabled=?5, updated_at=?6 WHERE id=?7 AND owner_id=?8",
                params![
                    rule.name.clone(),
                    to_json(&rule.conditions)?,
                    to_json(&rule.actions)?,
                    rule.priority,
                    rule.is_enabled as i64,
                    format_datetime(&rule.updated_at),
                    rule.id.to_string(),
                    rule.owner_id.clone(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_rule: {e}")))?;
        Ok(count > 0)
    }

    async fn set_rule_enabled(
        &self,
        id: Uuid,
        owner_id: &str,
        enabled: bool,
    ) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE routing_rules SET is_enabled=?1, updated_at=?2 WHERE id=?3 AND owner_id=?4",
                params![
                    enabled as i64,
                    format_datetime(&crate::routing::model::now()),
                    id.to_string(),
                    owner_id,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_rule_enabled: {e}")))?;
        Ok(count > 0)
    }

    async fn toggle_rule_enabled(
        &self,
        id: Uuid,
        owner_id: &str,
    ) -> Result<Option<bool>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "UPDATE routing_rules SET is_enabled = 1 - is_enabled, updated_at = ?1 WHERE id = ?2 AND owner_id = ?3 RETURNING is_enabled",
                params![
                    format_datetime(&crate::routing::model::now()),
                    id.to_string(),
                    owner_id,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("toggle_rule_enabled: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("toggle_rule_enabled: {e}")))?;
        match row {
            Some(row) => {
                let enabled = row
                    .get::<i64>(0)
                    .map_err(|e| DatabaseError::Serialization(format!("is_enabled: {e}")))?;
                Ok(Some(enabled != 0))
            }
            None => Ok(None),
        }
    }

    async fn delete_rule(&self, id: Uuid, owner_id: &str) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM routing_rules WHERE id = ?1 AND owner_id = ?2",
                params![id.to_string(), owner_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_rule: {e}")))?;
        Ok(count > 0)
    }

    async fn delete_rules_for_owner(&self, owner_id: &str) -> Result<usize, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM routing_rules WHERE owner_id = ?1",
                params![owner_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_rules_for_owner: {e}")))?;
        Ok(count as usize)
    }

    // ── Delivery logs ───────────────────────────────────────────────

    async fn append_delivery_log(&self, entry: &DeliveryLogEntry) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO delivery_logs ({LOG_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                params![
                    entry.id.to_string(),
                    entry.owner_id.clone(),
                    opt_text(entry.rule_id.map(|id| id.to_string())),
                    entry.channel.as_str(),
                    entry.destination.clone(),
                    entry.content.clone(),
                    entry.status.to_string(),
                    opt_text(entry.error.clone()),
                    format_datetime(&entry.created_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("append_delivery_log: {e}")))?;
        Ok(())
    }

    async fn list_delivery_logs(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<DeliveryLogEntry>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {LOG_COLUMNS} FROM delivery_logs WHERE owner_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2"
                ),
                params![owner_id, limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_delivery_logs: {e}")))?;

        let mut entries = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_delivery_logs: {e}")))?
        {
            entries.push(row_to_log(&row)?);
        }
        Ok(entries)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
