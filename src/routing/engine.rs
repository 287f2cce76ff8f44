//! Routing engine — loads an owner's rules, matches content, dispatches actions.
//!
//! A routing pass reads the enabled rule set once, evaluates every rule
//! against the same snapshot, fans the matched actions out concurrently and
//! appends one delivery log entry per attempt. Dispatch failures end up in
//! the report; only invalid input or a store read failure aborts the pass.

use std::cmp::Ordering;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::dispatch::Dispatcher;
use crate::error::{self, RoutingError};
use crate::routing::condition::ConditionEvaluator;
use crate::routing::matcher::RuleMatcher;
use crate::routing::model::{Action, DeliveryLogEntry, DeliveryReport, RoutingRule, RuleDraft};
use crate::store::{Database, LibSqlBackend};

/// Default page size for delivery log listings.
pub const DEFAULT_LOG_LIMIT: usize = 50;

/// Upper bound for delivery log listings.
pub const MAX_LOG_LIMIT: usize = 500;

/// The routing engine.
pub struct RoutingEngine {
    store: Arc<dyn Database>,
    dispatcher: Arc<Dispatcher>,
    matcher: RuleMatcher,
}

impl RoutingEngine {
    /// Open the configured database and wire every built-in channel.
    pub async fn from_config(config: &RelayConfig) -> error::Result<Self> {
        let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);
        let dispatcher = Arc::new(Dispatcher::from_config(config)?);
        let matcher = RuleMatcher::new(
            ConditionEvaluator::new().strict(config.routing.strict_conditions),
        );
        Ok(Self::new(store, dispatcher, matcher))
    }

    pub fn new(store: Arc<dyn Database>, dispatcher: Arc<Dispatcher>, matcher: RuleMatcher) -> Self {
        Self {
            store,
            dispatcher,
            matcher,
        }
    }

    /// Route `text` for `owner_id` through every matching enabled rule.
    pub async fn route(&self, owner_id: &str, text: &str) -> Result<DeliveryReport, RoutingError> {
        let owner_id = require_owner(owner_id)?;
        if text.trim().is_empty() {
            return Err(RoutingError::validation("content", "must not be empty"));
        }

        let mut rules = self.store.list_enabled_rules(owner_id).await?;
        rules.retain(|rule| rule.is_enabled);
        rules.sort_by(rule_order);

        let matched: Vec<&RoutingRule> = rules
            .iter()
            .filter(|rule| self.matcher.matches(text, rule))
            .collect();

        let planned: Vec<(Uuid, &Action)> = matched
            .iter()
            .flat_map(|rule| rule.actions.iter().map(move |action| (rule.id, action)))
            .collect();

        debug!(
            owner_id,
            rules = rules.len(),
            matched = matched.len(),
            actions = planned.len(),
            "Rules evaluated"
        );

        let attempts = planned.iter().map(|(rule_id, action)| async move {
            let mut entry = self.dispatcher.dispatch(action, text, owner_id).await;
            entry.rule_id = Some(*rule_id);
            entry
        });
        let deliveries: Vec<DeliveryLogEntry> = join_all(attempts).await;

        for entry in &deliveries {
            if let Err(e) = self.store.append_delivery_log(entry).await {
                warn!(
                    owner_id,
                    entry_id = %entry.id,
                    channel = %entry.channel,
                    "Failed to append delivery log: {e}"
                );
            }
        }

        let report = DeliveryReport {
            matched_rules: matched.iter().map(|rule| rule.id).collect(),
            deliveries,
        };
        info!(
            owner_id,
            matched = report.matched_rules.len(),
            deliveries = report.deliveries.len(),
            "Routing pass complete"
        );
        Ok(report)
    }

    /// Whether `rule` would match `text`. Never dispatches or logs.
    pub fn test_rule(&self, rule: &RoutingRule, text: &str) -> bool {
        self.matcher.matches(text, rule)
    }

    /// Load an owner's rule and check it against `text`.
    pub async fn test_rule_by_id(
        &self,
        rule_id: Uuid,
        owner_id: &str,
        text: &str,
    ) -> Result<bool, RoutingError> {
        let rule = self.get_rule(rule_id, owner_id).await?;
        Ok(self.test_rule(&rule, text))
    }

    // ── Rule management ─────────────────────────────────────────────

    pub async fn create_rule(
        &self,
        owner_id: &str,
        draft: RuleDraft,
    ) -> Result<RoutingRule, RoutingError> {
        let owner_id = require_owner(owner_id)?;
        let rule = draft.into_rule(owner_id)?;
        self.store.create_rule(&rule).await?;
        info!(owner_id, rule_id = %rule.id, name = %rule.name, "Routing rule created");
        Ok(rule)
    }

    pub async fn get_rule(&self, id: Uuid, owner_id: &str) -> Result<RoutingRule, RoutingError> {
        let owner_id = require_owner(owner_id)?;
        self.store
            .get_rule(id, owner_id)
            .await?
            .ok_or(RoutingError::NotFound { id })
    }

    pub async fn list_rules(&self, owner_id: &str) -> Result<Vec<RoutingRule>, RoutingError> {
        let owner_id = require_owner(owner_id)?;
        Ok(self.store.list_rules(owner_id).await?)
    }

    /// Replace the editable fields of an existing rule.
    pub async fn update_rule(
        &self,
        id: Uuid,
        owner_id: &str,
        draft: RuleDraft,
    ) -> Result<RoutingRule, RoutingError> {
        let mut rule = self.get_rule(id, owner_id).await?;
        draft.apply_to(&mut rule)?;
        if !self.store.update_rule(&rule).await? {
            return Err(RoutingError::NotFound { id });
        }
        info!(owner_id, rule_id = %id, "Routing rule updated");
        Ok(rule)
    }

    /// Flip a rule's enabled flag and return the updated rule.
    ///
    /// The flip is a single store statement, so a concurrent update of the
    /// rule's other fields is never overwritten.
    pub async fn toggle_rule(&self, id: Uuid, owner_id: &str) -> Result<RoutingRule, RoutingError> {
        let owner_id = require_owner(owner_id)?;
        let enabled = self
            .store
            .toggle_rule_enabled(id, owner_id)
            .await?
            .ok_or(RoutingError::NotFound { id })?;
        info!(owner_id, rule_id = %id, enabled, "Routing rule toggled");
        self.get_rule(id, owner_id).await
    }

    /// Set a rule's enabled flag without touching its other fields.
    pub async fn set_rule_enabled(
        &self,
        id: Uuid,
        owner_id: &str,
        enabled: bool,
    ) -> Result<RoutingRule, RoutingError> {
        let owner_id = require_owner(owner_id)?;
        if !self.store.set_rule_enabled(id, owner_id, enabled).await? {
            return Err(RoutingError::NotFound { id });
        }
        info!(owner_id, rule_id = %id, enabled, "Routing rule enabled flag set");
        self.get_rule(id, owner_id).await
    }

    pub async fn delete_rule(&self, id: Uuid, owner_id: &str) -> Result<(), RoutingError> {
        let owner_id = require_owner(owner_id)?;
        if !self.store.delete_rule(id, owner_id).await? {
            return Err(RoutingError::NotFound { id });
        }
        info!(owner_id, rule_id = %id, "Routing rule deleted");
        Ok(())
    }

    /// Remove every rule an owner has (owner deletion). Delivery logs stay.
    pub async fn remove_owner(&self, owner_id: &str) -> Result<usize, RoutingError> {
        let owner_id = require_owner(owner_id)?;
        let removed = self.store.delete_rules_for_owner(owner_id).await?;
        info!(owner_id, removed, "Owner rules removed");
        Ok(removed)
    }

    /// Recent delivery log entries, newest first. `limit` is clamped to 1..=MAX_LOG_LIMIT.
    pub async fn delivery_logs(
        &self,
        owner_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<DeliveryLogEntry>, RoutingError> {
        let owner_id = require_owner(owner_id)?;
        let limit = limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);
        Ok(self.store.list_delivery_logs(owner_id, limit).await?)
    }
}

fn require_owner(owner_id: &str) -> Result<&str, RoutingError> {
    let owner_id = owner_id.trim();
    if owner_id.is_empty() {
        return Err(RoutingError::validation("owner_id", "must not be empty"));
    }
    Ok(owner_id)
}

/// Priority descending, then oldest first, then id.
fn rule_order(a: &RoutingRule, b: &RoutingRule) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}
