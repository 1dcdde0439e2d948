//! Custom Test Assertions
//!
//! Provides specialized assertion helpers for domain types that give
//! more meaningful error messages than standard assertions.

use domain_rules::{ActionType, RuleSetEvaluation};
use domain_workflow::{WorkflowEvent, WorkflowInstance, WorkflowStatus};

/// Asserts that an evaluation succeeded and matched exactly the named rules, in order
///
/// # Panics
///
/// Panics if the evaluation failed or the matched rule names differ.
pub fn assert_matched_rules(evaluation: &RuleSetEvaluation, expected: &[&str]) {
    assert!(
        evaluation.success,
        "Evaluation of {:?} failed: {}",
        evaluation.category,
        evaluation.error.as_deref().unwrap_or("no error recorded")
    );

    let actual: Vec<&str> = evaluation
        .matched_rules
        .iter()
        .map(|m| m.rule_name.as_str())
        .collect();
    assert_eq!(
        actual, expected,
        "Matched rules differ for {:?}: actual={actual:?}, expected={expected:?}",
        evaluation.category
    );
}

/// Asserts that the highest-priority consolidated action has the given type
pub fn assert_top_action(evaluation: &RuleSetEvaluation, expected: ActionType) {
    let top = evaluation
        .actions
        .first()
        .unwrap_or_else(|| panic!("No consolidated actions for {:?}", evaluation.category));
    assert_eq!(
        top.action_type, expected,
        "Top action for {:?} is {:?}, expected {:?}",
        evaluation.category, top.action_type, expected
    );
}

/// Asserts that the evaluation confidence lies in `[low, high]`
pub fn assert_confidence_between(evaluation: &RuleSetEvaluation, low: f64, high: f64) {
    assert!(
        evaluation.confidence >= low && evaluation.confidence <= high,
        "Confidence {} outside [{low}, {high}] for {:?}",
        evaluation.confidence,
        evaluation.category
    );
}

/// Asserts a workflow instance's status
pub fn assert_workflow_status(instance: &WorkflowInstance, expected: WorkflowStatus) {
    assert_eq!(
        instance.status(),
        expected,
        "Workflow {} is {:?}, expected {:?} (step: {:?})",
        instance.id(),
        instance.status(),
        expected,
        instance.current_step()
    );
}

/// Asserts that events carry exactly the given type names, in order
pub fn assert_event_types(events: &[WorkflowEvent], expected: &[&str]) {
    let actual: Vec<&str> = events.iter().map(|e| e.kind.type_name()).collect();
    assert_eq!(
        actual, expected,
        "Event sequence differs: actual={actual:?}, expected={expected:?}"
    );
}

/// Asserts that event versions ascend by exactly one with no gaps
///
/// # Panics
///
/// Panics on the first gap or duplicate version.
pub fn assert_contiguous_versions(events: &[WorkflowEvent]) {
    for pair in events.windows(2) {
        assert_eq!(
            pair[1].version,
            pair[0].version + 1,
            "Version gap between events {} (v{}) and {} (v{})",
            pair[0].id,
            pair[0].version,
            pair[1].id,
            pair[1].version
        );
    }
}
