//! Business rule model
//!
//! Rules are configured by clinical/payer analysts, stored externally, and
//! loaded per category at evaluation time. A rule couples a condition tree
//! with the actions to take when it matches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::RuleId;

use crate::condition::RuleCondition;

/// Business category a rule belongs to
///
/// Rules are loaded and evaluated one category at a time; a workflow step
/// names the category it wants applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    MedicalNecessity,
    Eligibility,
    ProviderNetwork,
    CostManagement,
    FraudDetection,
    Compliance,
    PriorAuthorization,
    ClaimsProcessing,
}

/// Lifecycle status of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Active,
    Inactive,
    Draft,
}

/// Action type a matched rule can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Approve,
    Deny,
    Pend,
    RequestInfo,
    Escalate,
    Assign,
    Notify,
    Integrate,
    Calculate,
    Validate,
    Transform,
    Delay,
}

impl ActionType {
    /// Human-readable recommendation sentence for this action
    ///
    /// Used by the engine to derive the recommendation text from the single
    /// highest-priority consolidated action.
    pub fn recommendation(&self) -> &'static str {
        match self {
            ActionType::Approve => "Approve the request automatically",
            ActionType::Deny => "Deny the request",
            ActionType::Pend => "Pend the request for manual review",
            ActionType::RequestInfo => "Request additional information",
            ActionType::Escalate => "Escalate to a senior reviewer",
            ActionType::Assign => "Assign to the designated queue",
            ActionType::Notify => "Send a notification",
            ActionType::Integrate => "Query an external system",
            ActionType::Calculate => "Run the configured calculation",
            ActionType::Validate => "Run the configured validation",
            ActionType::Transform => "Apply the configured transformation",
            ActionType::Delay => "Delay processing",
        }
    }
}

/// An action requested by a matched rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleAction {
    /// What to do
    pub action_type: ActionType,
    /// Free-form action parameters
    #[serde(default)]
    pub parameters: serde_json::Value,
    /// Optional guard: the action only applies if this condition also holds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<RuleCondition>,
    /// Tie-break priority; lower value wins on conflict
    pub priority: u32,
}

impl RuleAction {
    /// Creates an unguarded action with empty parameters
    pub fn new(action_type: ActionType, priority: u32) -> Self {
        Self {
            action_type,
            parameters: serde_json::Value::Null,
            guard: None,
            priority,
        }
    }

    /// Sets the action parameters
    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Sets a guard condition
    pub fn with_guard(mut self, guard: RuleCondition) -> Self {
        self.guard = Some(guard);
        self
    }
}

/// A declarative business rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessRule {
    /// Unique rule identifier
    pub id: RuleId,
    /// Short rule name
    pub name: String,
    /// Longer description for reviewers
    #[serde(default)]
    pub description: Option<String>,
    /// Category this rule belongs to
    pub category: RuleCategory,
    /// Evaluation weight; lower value = preferred first in tie-breaking
    pub priority: u32,
    /// Lifecycle status
    pub status: RuleStatus,
    /// Instant the rule becomes effective
    pub effective_from: DateTime<Utc>,
    /// Instant the rule expires; `None` = open-ended
    #[serde(default)]
    pub effective_until: Option<DateTime<Utc>>,
    /// Rule version string
    pub version: String,
    /// Condition tree deciding whether the rule matches
    pub condition: RuleCondition,
    /// Actions requested when the rule matches, in declaration order
    pub actions: Vec<RuleAction>,
    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
}

impl BusinessRule {
    /// Whether this rule is applicable at the given instant
    ///
    /// A rule is applicable only if it is active and `at` lies within
    /// `[effective_from, effective_until)`; no expiration means open-ended.
    pub fn is_applicable_at(&self, at: DateTime<Utc>) -> bool {
        if self.status != RuleStatus::Active {
            return false;
        }
        if at < self.effective_from {
            return false;
        }
        match self.effective_until {
            Some(until) => at < until,
            None => true,
        }
    }
}
