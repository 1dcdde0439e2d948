//! Integration tests for the workflow engine
//!
//! Wire the engine to real in-memory stores and a scripted integration
//! dispatcher, then drive authorization workflows end to end.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use core_kernel::{OperationMetadata, PortError, RuleId, Value, WorkflowId};
use domain_rules::{
    ActionType, BusinessRule, ComparisonOperator, DataType, RuleAction, RuleCategory,
    RuleCondition, RuleStatus, RulesEngine,
};
use domain_workflow::{
    EventStore, IntegrationDispatch, WorkflowEngine, WorkflowEventKind, WorkflowInstance,
    WorkflowPersistence, WorkflowPriority, WorkflowStatus,
};
use infra_store::{InMemoryRuleStore, InMemoryWorkflowStore};

// ============================================================================
// Fixtures
// ============================================================================

fn meta() -> OperationMetadata {
    OperationMetadata::new("engine-tests")
}

fn rule(name: &str, category: RuleCategory, actions: Vec<RuleAction>) -> BusinessRule {
    BusinessRule {
        id: RuleId::new(),
        name: name.to_string(),
        description: None,
        category,
        priority: 10,
        status: RuleStatus::Active,
        effective_from: Utc::now() - Duration::days(1),
        effective_until: None,
        version: "1.0.0".to_string(),
        condition: RuleCondition::simple(
            "patient.age",
            ComparisonOperator::GreaterThanOrEqual,
            Value::Number(65.0),
            DataType::Number,
        ),
        actions,
        tags: vec![],
    }
}

/// Scripted dispatcher that records calls and returns a fixed payload
struct ScriptedDispatch {
    calls: AtomicUsize,
    response: serde_json::Value,
}

impl ScriptedDispatch {
    fn returning(response: serde_json::Value) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            response,
        }
    }
}

#[async_trait]
impl IntegrationDispatch for ScriptedDispatch {
    async fn dispatch(
        &self,
        _integration: &str,
        _operation: &str,
        _payload: serde_json::Value,
        _metadata: &OperationMetadata,
    ) -> Result<serde_json::Value, PortError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

/// Dispatcher that always fails, like an unreachable clearinghouse
struct FailingDispatch;

#[async_trait]
impl IntegrationDispatch for FailingDispatch {
    async fn dispatch(
        &self,
        _integration: &str,
        _operation: &str,
        _payload: serde_json::Value,
        _metadata: &OperationMetadata,
    ) -> Result<serde_json::Value, PortError> {
        Err(PortError::connection("connection refused"))
    }
}

struct Harness {
    persistence: Arc<InMemoryWorkflowStore>,
    rule_store: Arc<InMemoryRuleStore>,
    engine: WorkflowEngine<InMemoryWorkflowStore>,
}

fn harness(dispatch: Option<Arc<dyn IntegrationDispatch>>) -> Harness {
    let persistence = Arc::new(InMemoryWorkflowStore::new());
    let rule_store = Arc::new(InMemoryRuleStore::new());
    let rules = Arc::new(RulesEngine::new(
        Arc::clone(&rule_store) as Arc<dyn domain_rules::RuleStore>
    ));
    let store = EventStore::new(Arc::clone(&persistence));
    let mut engine = WorkflowEngine::new(store, rules);
    if let Some(dispatch) = dispatch {
        engine = engine.with_integrations(dispatch);
    }
    Harness {
        persistence,
        rule_store,
        engine,
    }
}

async fn start_senior_auth(engine: &WorkflowEngine<InMemoryWorkflowStore>) -> WorkflowId {
    let instance = engine
        .start_workflow(
            "prior-auth",
            "3",
            "authorization_request",
            "AUTH-500",
            WorkflowPriority::High,
            BTreeMap::from([("patient.age".to_string(), serde_json::json!(72))]),
            &meta(),
        )
        .await
        .unwrap();
    instance.id()
}

// ============================================================================
// Step execution
// ============================================================================

#[tokio::test]
async fn test_step_records_decision_per_category() {
    let h = harness(None);
    h.rule_store
        .save_rule(rule(
            "senior fast track",
            RuleCategory::Eligibility,
            vec![RuleAction::new(ActionType::Approve, 1)],
        ))
        .await
        .unwrap();

    let workflow_id = start_senior_auth(&h.engine).await;
    let outcome = h
        .engine
        .execute_step(
            workflow_id,
            "eligibility_check",
            &[RuleCategory::Eligibility, RuleCategory::FraudDetection],
            &meta(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Running);
    assert_eq!(outcome.evaluations.len(), 2);
    assert!(outcome.evaluations[0].success);
    assert_eq!(outcome.evaluations[0].matched_rules.len(), 1);
    assert_eq!(
        outcome.evaluations[0].actions[0].action_type,
        ActionType::Approve
    );
    // No fraud rules configured; the evaluation still succeeds.
    assert!(outcome.evaluations[1].success);
    assert!(outcome.evaluations[1].matched_rules.is_empty());

    let history = h
        .engine
        .store()
        .history(workflow_id)
        .await
        .unwrap();
    let decisions: Vec<_> = history
        .iter()
        .filter(|e| matches!(e.kind, WorkflowEventKind::DecisionRecorded { .. }))
        .collect();
    assert_eq!(decisions.len(), 2);
}

#[tokio::test]
async fn test_integrate_action_feeds_response_into_variables() {
    let dispatch = Arc::new(ScriptedDispatch::returning(serde_json::json!({
        "eligible": true,
        "plan": "PPO-GOLD"
    })));
    let h = harness(Some(Arc::clone(&dispatch) as Arc<dyn IntegrationDispatch>));

    h.rule_store
        .save_rule(rule(
            "verify coverage externally",
            RuleCategory::Eligibility,
            vec![RuleAction::new(ActionType::Integrate, 1).with_parameters(serde_json::json!({
                "integration": "availity",
                "operation": "eligibility_check",
                "payload": { "member_id": "M-1" },
                "result_variable": "eligibility.response"
            }))],
        ))
        .await
        .unwrap();

    let workflow_id = start_senior_auth(&h.engine).await;
    let outcome = h
        .engine
        .execute_step(
            workflow_id,
            "eligibility_check",
            &[RuleCategory::Eligibility],
            &meta(),
        )
        .await
        .unwrap();

    assert_eq!(dispatch.calls.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.integrations.len(), 1);
    assert!(outcome.integrations[0].success);
    assert_eq!(outcome.integrations[0].integration, "availity");

    let loaded = h.engine.store().load(workflow_id).await.unwrap();
    assert_eq!(
        loaded.variables().get("eligibility.response"),
        Some(&serde_json::json!({ "eligible": true, "plan": "PPO-GOLD" }))
    );

    let history = h.engine.store().history(workflow_id).await.unwrap();
    assert!(history.iter().any(|e| matches!(
        &e.kind,
        WorkflowEventKind::IntegrationCompleted { integration, success: true, .. }
            if integration == "availity"
    )));
}

#[tokio::test]
async fn test_failed_integration_recorded_without_aborting_step() {
    let h = harness(Some(Arc::new(FailingDispatch)));
    h.rule_store
        .save_rule(rule(
            "verify coverage externally",
            RuleCategory::Eligibility,
            vec![RuleAction::new(ActionType::Integrate, 1)
                .with_parameters(serde_json::json!({ "integration": "availity" }))],
        ))
        .await
        .unwrap();

    let workflow_id = start_senior_auth(&h.engine).await;
    let outcome = h
        .engine
        .execute_step(
            workflow_id,
            "eligibility_check",
            &[RuleCategory::Eligibility],
            &meta(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.integrations.len(), 1);
    assert!(!outcome.integrations[0].success);
    assert_eq!(outcome.status, WorkflowStatus::Running);

    let history = h.engine.store().history(workflow_id).await.unwrap();
    assert!(history.iter().any(|e| matches!(
        &e.kind,
        WorkflowEventKind::IntegrationCompleted { success: false, .. }
    )));
}

#[tokio::test]
async fn test_integrate_without_dispatcher_is_recorded_failure() {
    let h = harness(None);
    h.rule_store
        .save_rule(rule(
            "verify coverage externally",
            RuleCategory::Eligibility,
            vec![RuleAction::new(ActionType::Integrate, 1)
                .with_parameters(serde_json::json!({ "integration": "availity" }))],
        ))
        .await
        .unwrap();

    let workflow_id = start_senior_auth(&h.engine).await;
    let outcome = h
        .engine
        .execute_step(
            workflow_id,
            "eligibility_check",
            &[RuleCategory::Eligibility],
            &meta(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.integrations.len(), 1);
    assert!(!outcome.integrations[0].success);
}

// ============================================================================
// Lifecycle helpers
// ============================================================================

#[tokio::test]
async fn test_full_lifecycle_to_completion() {
    let h = harness(None);
    let workflow_id = start_senior_auth(&h.engine).await;

    h.engine.assign(workflow_id, "reviewer-1", &meta()).await.unwrap();
    h.engine
        .execute_step(workflow_id, "clinical_review", &[], &meta())
        .await
        .unwrap();
    let finished = h
        .engine
        .complete_workflow(workflow_id, Some("approved".to_string()), &meta())
        .await
        .unwrap();

    assert_eq!(finished.status(), WorkflowStatus::Completed);
    assert!(finished.finished_at().is_some());

    // Terminal instances reject further steps.
    let result = h
        .engine
        .execute_step(workflow_id, "another", &[], &meta())
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_cancel_records_reason() {
    let h = harness(None);
    let workflow_id = start_senior_auth(&h.engine).await;

    let cancelled = h
        .engine
        .cancel_workflow(workflow_id, "member withdrew the request", &meta())
        .await
        .unwrap();
    assert_eq!(cancelled.status(), WorkflowStatus::Cancelled);

    let history = h.engine.store().history(workflow_id).await.unwrap();
    assert!(history.iter().any(|e| matches!(
        &e.kind,
        WorkflowEventKind::Cancelled { reason } if reason == "member withdrew the request"
    )));
}

#[tokio::test]
async fn test_terminal_commit_emits_duration_metric() {
    let h = harness(None);
    let workflow_id = start_senior_auth(&h.engine).await;
    h.engine
        .fail_workflow(workflow_id, "upstream denied", &meta())
        .await
        .unwrap();

    let metrics = h.persistence.metrics().await;
    let names: Vec<&str> = metrics.iter().map(|m| m.name.as_str()).collect();
    assert!(names.contains(&"duration_ms"));
    assert!(names.contains(&"event_count"));
}

// ============================================================================
// Write-race retry
// ============================================================================

/// Dispatcher that sabotages the first attempt by appending a rival event
/// to the stream between the engine's load and its commit
struct RacingDispatch {
    persistence: Arc<InMemoryWorkflowStore>,
    calls: AtomicUsize,
}

#[async_trait]
impl IntegrationDispatch for RacingDispatch {
    async fn dispatch(
        &self,
        _integration: &str,
        _operation: &str,
        _payload: serde_json::Value,
        _metadata: &OperationMetadata,
    ) -> Result<serde_json::Value, PortError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            // Replay the stream, apply a rival command, and commit it so
            // the engine's in-flight commit hits a version conflict.
            let events = self
                .persistence
                .find_events(&domain_workflow::EventFilter::default())
                .await?;
            let mut rival = WorkflowInstance::replay(&events)
                .map_err(|e| PortError::internal(e.to_string()))?;
            let expected = rival.version();
            rival
                .assign("rival-reviewer", &OperationMetadata::new("rival"))
                .map_err(|e| PortError::internal(e.to_string()))?;
            let rival_events = rival.take_events();
            self.persistence
                .append_events(rival.id(), &rival_events, expected, &rival)
                .await?;
        }
        Ok(serde_json::json!({ "eligible": true }))
    }
}

#[tokio::test]
async fn test_step_retries_after_losing_write_race() {
    let persistence = Arc::new(InMemoryWorkflowStore::new());
    let rule_store = Arc::new(InMemoryRuleStore::new());
    let rules = Arc::new(RulesEngine::new(
        Arc::clone(&rule_store) as Arc<dyn domain_rules::RuleStore>
    ));
    let dispatch = Arc::new(RacingDispatch {
        persistence: Arc::clone(&persistence),
        calls: AtomicUsize::new(0),
    });
    let engine = WorkflowEngine::new(EventStore::new(Arc::clone(&persistence)), rules)
        .with_integrations(Arc::clone(&dispatch) as Arc<dyn IntegrationDispatch>);

    rule_store
        .save_rule(rule(
            "verify coverage externally",
            RuleCategory::Eligibility,
            vec![RuleAction::new(ActionType::Integrate, 1)
                .with_parameters(serde_json::json!({ "integration": "availity" }))],
        ))
        .await
        .unwrap();

    let workflow_id = start_senior_auth(&engine).await;
    let outcome = engine
        .execute_step(
            workflow_id,
            "eligibility_check",
            &[RuleCategory::Eligibility],
            &meta(),
        )
        .await
        .unwrap();

    // First attempt lost the race; the retry re-ran the step.
    assert_eq!(dispatch.calls.load(Ordering::SeqCst), 2);
    assert!(outcome.integrations[0].success);

    // The rival's write survived alongside the retried step.
    let loaded = engine.store().load(workflow_id).await.unwrap();
    assert_eq!(loaded.assigned_to(), Some("rival-reviewer"));
    assert_eq!(loaded.status(), WorkflowStatus::Running);
}
