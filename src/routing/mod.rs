//! Rule-based routing of assistant output to external channels.

pub mod condition;
pub mod engine;
pub mod matcher;
pub mod model;

pub use condition::{ConditionEvaluator, ConditionStrategy};
pub use engine::RoutingEngine;
pub use matcher::RuleMatcher;
pub use model::{
    Action, ChannelKind, Condition, ConditionKind, DeliveryLogEntry, DeliveryReport,
    DeliveryStatus, RoutingRule, RuleDraft,
};
