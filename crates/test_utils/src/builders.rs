//! Test Data Builders
//!
//! Provides builder patterns for constructing test data with sensible
//! defaults. These builders allow tests to specify only the relevant
//! fields while using defaults for everything else.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use core_kernel::{RuleId, Value};
use domain_rules::{
    ActionType, BusinessRule, ComparisonOperator, DataType, RuleAction, RuleCategory,
    RuleCondition, RuleStatus,
};
use domain_workflow::{WorkflowInstance, WorkflowPriority};

use crate::fixtures::{MetadataFixtures, TemporalFixtures, VariableFixtures};

/// Builder for constructing test business rules
pub struct TestRuleBuilder {
    name: String,
    category: RuleCategory,
    priority: u32,
    status: RuleStatus,
    effective_from: DateTime<Utc>,
    effective_until: Option<DateTime<Utc>>,
    condition: RuleCondition,
    actions: Vec<RuleAction>,
    tags: Vec<String>,
}

impl Default for TestRuleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRuleBuilder {
    /// Creates a new builder with default values
    ///
    /// The default rule approves any patient aged 65 or over, in the
    /// eligibility category, effective across all of 2024.
    pub fn new() -> Self {
        Self {
            name: "senior eligibility".to_string(),
            category: RuleCategory::Eligibility,
            priority: 10,
            status: RuleStatus::Active,
            effective_from: TemporalFixtures::effective_from(),
            effective_until: None,
            condition: RuleCondition::simple(
                "patient.age",
                ComparisonOperator::GreaterThanOrEqual,
                Value::from(65.0),
                DataType::Number,
            ),
            actions: vec![RuleAction::new(ActionType::Approve, 1)],
            tags: Vec::new(),
        }
    }

    /// Sets the rule name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the rule category
    pub fn with_category(mut self, category: RuleCategory) -> Self {
        self.category = category;
        self
    }

    /// Sets the rule priority
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the lifecycle status
    pub fn with_status(mut self, status: RuleStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the effective window
    pub fn with_window(mut self, from: DateTime<Utc>, until: Option<DateTime<Utc>>) -> Self {
        self.effective_from = from;
        self.effective_until = until;
        self
    }

    /// Sets the condition tree
    pub fn with_condition(mut self, condition: RuleCondition) -> Self {
        self.condition = condition;
        self
    }

    /// Replaces the action list
    pub fn with_actions(mut self, actions: Vec<RuleAction>) -> Self {
        self.actions = actions;
        self
    }

    /// Appends one action
    pub fn with_action(mut self, action: RuleAction) -> Self {
        self.actions.push(action);
        self
    }

    /// Appends a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Builds the business rule
    pub fn build(self) -> BusinessRule {
        BusinessRule {
            id: RuleId::new(),
            name: self.name,
            description: None,
            category: self.category,
            priority: self.priority,
            status: self.status,
            effective_from: self.effective_from,
            effective_until: self.effective_until,
            version: "1.0.0".to_string(),
            condition: self.condition,
            actions: self.actions,
            tags: self.tags,
        }
    }
}

/// Builder for constructing started workflow instances
pub struct TestWorkflowBuilder {
    definition_id: String,
    definition_version: String,
    entity_type: String,
    entity_id: String,
    priority: WorkflowPriority,
    variables: BTreeMap<String, serde_json::Value>,
}

impl Default for TestWorkflowBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorkflowBuilder {
    /// Creates a new builder defaulting to a prior-authorization workflow
    pub fn new() -> Self {
        Self {
            definition_id: "prior_auth".to_string(),
            definition_version: "1.0.0".to_string(),
            entity_type: "authorization".to_string(),
            entity_id: "AUTH-1001".to_string(),
            priority: WorkflowPriority::Normal,
            variables: VariableFixtures::prior_auth(),
        }
    }

    /// Sets the definition identifier
    pub fn with_definition(mut self, id: impl Into<String>) -> Self {
        self.definition_id = id.into();
        self
    }

    /// Sets the business entity under review
    pub fn with_entity(
        mut self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        self.entity_type = entity_type.into();
        self.entity_id = entity_id.into();
        self
    }

    /// Sets the scheduling priority
    pub fn with_priority(mut self, priority: WorkflowPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Replaces the starting variables
    pub fn with_variables(mut self, variables: BTreeMap<String, serde_json::Value>) -> Self {
        self.variables = variables;
        self
    }

    /// Sets one starting variable
    pub fn with_variable(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.variables.insert(key.into(), value);
        self
    }

    /// Builds the instance; its `Started` event is still uncommitted
    pub fn build(self) -> WorkflowInstance {
        WorkflowInstance::start(
            self.definition_id,
            self.definition_version,
            self.entity_type,
            self.entity_id,
            self.priority,
            self.variables,
            &MetadataFixtures::system(),
        )
    }
}
