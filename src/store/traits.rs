//! `Database` trait — single async interface for rule and delivery-log persistence.
//!
//! Every rule operation is scoped by owner: a rule that exists but belongs
//! to someone else is indistinguishable from a missing one.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::routing::model::{DeliveryLogEntry, RoutingRule};

/// Backend-agnostic database trait covering routing rules and delivery logs.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Rules ───────────────────────────────────────────────────────

    /// Insert a new rule.
    async fn create_rule(&self, rule: &RoutingRule) -> Result<(), DatabaseError>;

    /// Get a rule by id, scoped to its owner.
    async fn get_rule(&self, id: Uuid, owner_id: &str)
    -> Result<Option<RoutingRule>, DatabaseError>;

    /// All of an owner's rules, priority descending, oldest first within a priority.
    async fn list_rules(&self, owner_id: &str) -> Result<Vec<RoutingRule>, DatabaseError>;

    /// Enabled rules only, in the same order as `list_rules`.
    async fn list_enabled_rules(&self, owner_id: &str) -> Result<Vec<RoutingRule>, DatabaseError>;

    /// Overwrite a rule's editable fields. Returns false if no such rule for its owner.
    async fn update_rule(&self, rule: &RoutingRule) -> Result<bool, DatabaseError>;

    /// Set the enabled flag. Returns false if no such rule for the owner.
    async fn set_rule_enabled(
        &self,
        id: Uuid,
        owner_id: &str,
        enabled: bool,
    ) -> Result<bool, DatabaseError>;

    /// Flip the enabled flag in one statement. Returns the new flag, or
    /// `None` if no such rule for the owner.
    async fn toggle_rule_enabled(
        &self,
        id: Uuid,
        owner_id: &str,
    ) -> Result<Option<bool>, DatabaseError>;

    /// Delete a rule. Returns false if no such rule for the owner.
    async fn delete_rule(&self, id: Uuid, owner_id: &str) -> Result<bool, DatabaseError>;

    /// Delete all of an owner's rules (owner removal). Returns the number deleted.
    async fn delete_rules_for_owner(&self, owner_id: &str) -> Result<usize, DatabaseError>;

    // ── Delivery logs ───────────────────────────────────────────────

    /// Append one delivery log entry.
    async fn append_delivery_log(&self, entry: &DeliveryLogEntry) -> Result<(), DatabaseError>;

    /// Most recent entries for an owner, newest first.
    async fn list_delivery_logs(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<DeliveryLogEntry>, DatabaseError>;
}
