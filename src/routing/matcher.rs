//! Rule matching — AND over a rule's conditions.

use tracing::trace;

use crate::routing::condition::ConditionEvaluator;
use crate::routing::model::RoutingRule;

/// Matches rules against text using a condition evaluator.
#[derive(Debug, Clone, Default)]
pub struct RuleMatcher {
    evaluator: ConditionEvaluator,
}

impl RuleMatcher {
    pub fn new(evaluator: ConditionEvaluator) -> Self {
        Self { evaluator }
    }

    /// True iff every condition passes, in order, stopping at the first failure.
    /// A rule without conditions always matches.
    pub fn matches(&self, text: &str, rule: &RoutingRule) -> bool {
        for (index, condition) in rule.conditions.iter().enumerate() {
            if !self.evaluator.evaluate(text, condition) {
                trace!(
                    rule_id = %rule.id,
                    condition_index = index,
                    condition_type = %condition.kind,
                    "Condition failed"
                );
                return false;
            }
        }
        true
    }
}
