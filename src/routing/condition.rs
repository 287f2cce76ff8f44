//! Condition evaluation — pure text predicates, no I/O.
//!
//! `contains`, `starts_with` and `keyword` are case-insensitive substring
//! checks. `sentiment` and `time_of_day` are delegated to pluggable
//! strategies that pass by default. Unknown condition types pass unless
//! strict mode is on.

use std::sync::Arc;

use tracing::warn;

use crate::routing::model::{Condition, ConditionKind};

/// Decides a condition type that has no built-in text semantics.
pub trait ConditionStrategy: Send + Sync {
    fn evaluate(&self, text: &str, value: &str) -> bool;
}

/// Strategy that never rejects a message.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysPass;

impl ConditionStrategy for AlwaysPass {
    fn evaluate(&self, _text: &str, _value: &str) -> bool {
        true
    }
}

/// Evaluates single conditions against text.
#[derive(Clone)]
pub struct ConditionEvaluator {
    sentiment: Arc<dyn ConditionStrategy>,
    time_of_day: Arc<dyn ConditionStrategy>,
    /// Fail closed on unknown condition types.
    strict: bool,
}

impl Default for ConditionEvaluator {
    fn default() -> Self {
        Self {
            sentiment: Arc::new(AlwaysPass),
            time_of_day: Arc::new(AlwaysPass),
            strict: false,
        }
    }
}

impl std::fmt::Debug for ConditionEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionEvaluator")
            .field("strict", &self.strict)
            .finish_non_exhaustive()
    }
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_sentiment(mut self, strategy: Arc<dyn ConditionStrategy>) -> Self {
        self.sentiment = strategy;
        self
    }

    pub fn with_time_of_day(mut self, strategy: Arc<dyn ConditionStrategy>) -> Self {
        self.time_of_day = strategy;
        self
    }

    /// Evaluate one condition against `text`.
    pub fn evaluate(&self, text: &str, condition: &Condition) -> bool {
        match &condition.kind {
            ConditionKind::Contains => text
                .to_lowercase()
                .contains(&condition.value.to_lowercase()),
            ConditionKind::StartsWith => text
                .to_lowercase()
                .starts_with(&condition.value.to_lowercase()),
            ConditionKind::Keyword => keyword_match(text, &condition.value),
            ConditionKind::Sentiment => self.sentiment.evaluate(text, &condition.value),
            ConditionKind::TimeOfDay => self.time_of_day.evaluate(text, &condition.value),
            ConditionKind::Other(tag) => {
                warn!(
                    condition_type = %tag,
                    strict = self.strict,
                    "Unknown condition type"
                );
                !self.strict
            }
        }
    }
}

/// True iff any comma-separated, trimmed token occurs in `text`.
fn keyword_match(text: &str, keywords: &str) -> bool {
    let haystack = text.to_lowercase();
    keywords
        .split(',')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .any(|k| haystack.contains(&k))
}

/// Evaluate with the default (fail-open) evaluator.
pub fn evaluate(text: &str, condition: &Condition) -> bool {
    ConditionEvaluator::default().evaluate(text, condition)
}
