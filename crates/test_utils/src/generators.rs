//! Property-Based Test Generators
//!
//! Provides proptest strategies for generating random test data
//! that maintains domain invariants.

use std::collections::BTreeMap;

use core_kernel::Value;
use domain_rules::{
    ActionType, BusinessRule, ComparisonOperator, DataType, RuleAction, RuleCategory,
    RuleCondition,
};
use domain_workflow::WorkflowPriority;
use proptest::prelude::*;

use crate::builders::TestRuleBuilder;

/// Strategy for generating rule categories
pub fn rule_category_strategy() -> impl Strategy<Value = RuleCategory> {
    prop_oneof![
        Just(RuleCategory::MedicalNecessity),
        Just(RuleCategory::Eligibility),
        Just(RuleCategory::ProviderNetwork),
        Just(RuleCategory::CostManagement),
        Just(RuleCategory::FraudDetection),
        Just(RuleCategory::Compliance),
        Just(RuleCategory::PriorAuthorization),
        Just(RuleCategory::ClaimsProcessing),
    ]
}

/// Strategy for generating decision action types
pub fn decision_action_strategy() -> impl Strategy<Value = ActionType> {
    prop_oneof![
        Just(ActionType::Approve),
        Just(ActionType::Deny),
        Just(ActionType::Pend),
        Just(ActionType::RequestInfo),
        Just(ActionType::Escalate),
    ]
}

/// Strategy for generating rule priorities (1 = most preferred)
pub fn priority_strategy() -> impl Strategy<Value = u32> {
    1u32..100u32
}

/// Strategy for generating plausible patient ages
pub fn age_strategy() -> impl Strategy<Value = i64> {
    0i64..120i64
}

/// Strategy for generating workflow priorities
pub fn workflow_priority_strategy() -> impl Strategy<Value = WorkflowPriority> {
    prop_oneof![
        Just(WorkflowPriority::Low),
        Just(WorkflowPriority::Normal),
        Just(WorkflowPriority::High),
        Just(WorkflowPriority::Urgent),
    ]
}

/// Strategy for generating an age-threshold rule in a fixed category
///
/// The generated rule matches contexts where `patient.age >= threshold`
/// and carries a single decision action.
pub fn age_rule_strategy(category: RuleCategory) -> impl Strategy<Value = BusinessRule> {
    (age_strategy(), priority_strategy(), decision_action_strategy()).prop_map(
        move |(threshold, priority, action)| {
            TestRuleBuilder::new()
                .with_name(format!("age >= {threshold}"))
                .with_category(category)
                .with_priority(priority)
                .with_condition(RuleCondition::simple(
                    "patient.age",
                    ComparisonOperator::GreaterThanOrEqual,
                    Value::from(threshold as f64),
                    DataType::Number,
                ))
                .with_actions(vec![RuleAction::new(action, priority)])
                .build()
        },
    )
}

/// Strategy for generating a small set of age-threshold rules
pub fn rule_set_strategy(
    category: RuleCategory,
    max_rules: usize,
) -> impl Strategy<Value = Vec<BusinessRule>> {
    proptest::collection::vec(age_rule_strategy(category), 1..=max_rules)
}

/// Strategy for generating workflow variable maps
pub fn variables_strategy() -> impl Strategy<Value = BTreeMap<String, serde_json::Value>> {
    proptest::collection::btree_map(
        "[a-z]{2,6}\\.[a-z]{2,8}",
        prop_oneof![
            (-1000i64..1000i64).prop_map(|n| serde_json::Value::from(n)),
            "[A-Z]{3}-[0-9]{4}".prop_map(serde_json::Value::from),
            any::<bool>().prop_map(serde_json::Value::from),
        ],
        0..6,
    )
}
