//! Workflow engine
//!
//! Coordinates one step of a workflow instance: load, advance, evaluate the
//! configured rule categories against the instance's variables, dispatch
//! any `Integrate` actions to external systems, record the outcomes as
//! events, and commit. Commits that lose an optimistic-concurrency race are
//! retried from a fresh load a bounded number of times.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use core_kernel::{Context, OperationMetadata, PortError, Value, WorkflowId};
use domain_rules::{EvaluationOptions, RuleCategory, RuleSetEvaluation, RulesEngine};

use crate::analytics::WorkflowAnalytics;
use crate::error::WorkflowError;
use crate::instance::{WorkflowInstance, WorkflowPriority, WorkflowStatus};
use crate::ports::WorkflowPersistence;
use crate::store::EventStore;

/// Commit attempts per operation before giving up on a contended stream
const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Port for sending requests to named external integrations
///
/// Implemented by the integration layer; the engine dispatches `Integrate`
/// rule actions through it without knowing transport details.
#[async_trait]
pub trait IntegrationDispatch: Send + Sync {
    /// Sends one request and returns the mapped response payload
    async fn dispatch(
        &self,
        integration: &str,
        operation: &str,
        payload: serde_json::Value,
        metadata: &OperationMetadata,
    ) -> Result<serde_json::Value, PortError>;
}

/// Result of dispatching one `Integrate` action during a step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationOutcome {
    pub integration: String,
    pub operation: String,
    pub success: bool,
}

/// Result of executing one workflow step
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub workflow_id: WorkflowId,
    pub step: String,
    pub status: WorkflowStatus,
    /// One evaluation per requested rule category, in request order
    pub evaluations: Vec<RuleSetEvaluation>,
    pub integrations: Vec<IntegrationOutcome>,
}

/// Orchestrates workflow instances over an event store and a rules engine
pub struct WorkflowEngine<P> {
    store: EventStore<P>,
    rules: Arc<RulesEngine>,
    analytics: WorkflowAnalytics<P>,
    integrations: Option<Arc<dyn IntegrationDispatch>>,
}

impl<P: WorkflowPersistence> WorkflowEngine<P> {
    pub fn new(store: EventStore<P>, rules: Arc<RulesEngine>) -> Self {
        let analytics = WorkflowAnalytics::new(Arc::clone(store.persistence()));
        Self {
            store,
            rules,
            analytics,
            integrations: None,
        }
    }

    /// Attaches an integration dispatcher for `Integrate` rule actions
    ///
    /// Without one, `Integrate` actions are recorded as failed dispatches.
    pub fn with_integrations(mut self, integrations: Arc<dyn IntegrationDispatch>) -> Self {
        self.integrations = Some(integrations);
        self
    }

    pub fn store(&self) -> &EventStore<P> {
        &self.store
    }

    /// Starts a new workflow instance and commits its `Started` event
    pub async fn start_workflow(
        &self,
        definition_id: &str,
        definition_version: &str,
        entity_type: &str,
        entity_id: &str,
        priority: WorkflowPriority,
        variables: BTreeMap<String, serde_json::Value>,
        metadata: &OperationMetadata,
    ) -> Result<WorkflowInstance, WorkflowError> {
        let mut instance = WorkflowInstance::start(
            definition_id,
            definition_version,
            entity_type,
            entity_id,
            priority,
            variables,
            metadata,
        );

        let events = self.store.commit(&mut instance).await?;
        self.analytics.record(&instance, &events).await;

        info!(
            workflow_id = %instance.id(),
            definition = definition_id,
            entity_type,
            entity_id,
            "workflow started"
        );
        Ok(instance)
    }

    /// Executes one step of a workflow
    ///
    /// Advances to `step`, evaluates each rule category in order against
    /// the instance context, records a decision event per category, and
    /// dispatches any consolidated `Integrate` actions. Losing a commit
    /// race reloads the instance and re-runs the step, up to three attempts.
    pub async fn execute_step(
        &self,
        workflow_id: WorkflowId,
        step: &str,
        categories: &[RuleCategory],
        metadata: &OperationMetadata,
    ) -> Result<StepOutcome, WorkflowError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut instance = self.store.load(workflow_id).await?;
            let outcome = self
                .run_step(&mut instance, step, categories, metadata)
                .await?;

            match self.store.commit(&mut instance).await {
                Ok(events) => {
                    self.analytics.record(&instance, &events).await;
                    return Ok(StepOutcome {
                        status: instance.status(),
                        ..outcome
                    });
                }
                Err(e) if e.is_concurrency_conflict() && attempt < MAX_COMMIT_ATTEMPTS => {
                    warn!(
                        workflow_id = %workflow_id,
                        step,
                        attempt,
                        "step commit lost a write race, retrying from fresh state"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn run_step(
        &self,
        instance: &mut WorkflowInstance,
        step: &str,
        categories: &[RuleCategory],
        metadata: &OperationMetadata,
    ) -> Result<StepOutcome, WorkflowError> {
        instance.advance_step(step, metadata)?;

        let mut evaluations = Vec::with_capacity(categories.len());
        let mut integrations = Vec::new();

        for &category in categories {
            let context = build_context(instance);
            let evaluation = self
                .rules
                .evaluate_rules(category, &context, &EvaluationOptions::default())
                .await;

            let top_action = evaluation.actions.first().map(|a| a.action_type);
            instance.record_decision(
                category,
                top_action,
                evaluation.confidence,
                evaluation.recommendation.clone(),
                metadata,
            )?;

            for action in &evaluation.actions {
                if action.action_type == domain_rules::ActionType::Integrate {
                    let outcome = self
                        .dispatch_integration(instance, &action.parameters, metadata)
                        .await?;
                    integrations.push(outcome);
                }
            }

            evaluations.push(evaluation);
        }

        debug!(
            workflow_id = %instance.id(),
            step,
            categories = categories.len(),
            integrations = integrations.len(),
            "step executed"
        );

        Ok(StepOutcome {
            workflow_id: instance.id(),
            step: step.to_string(),
            status: instance.status(),
            evaluations,
            integrations,
        })
    }

    /// Dispatches one `Integrate` action and records its outcome
    ///
    /// Action parameters: `integration` (required), `operation` (defaults
    /// to `"query"`), `payload` (defaults to the empty object), and
    /// `result_variable` naming where the response lands in the instance
    /// variables (defaults to `integrations.<name>`). A failed dispatch is
    /// recorded and does not abort the step.
    async fn dispatch_integration(
        &self,
        instance: &mut WorkflowInstance,
        parameters: &serde_json::Value,
        metadata: &OperationMetadata,
    ) -> Result<IntegrationOutcome, WorkflowError> {
        let integration = parameters
            .get("integration")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        let operation = parameters
            .get("operation")
            .and_then(|v| v.as_str())
            .unwrap_or("query")
            .to_string();
        let payload = parameters
            .get("payload")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}));
        let result_variable = parameters
            .get("result_variable")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("integrations.{integration}"));

        let result = match &self.integrations {
            Some(dispatch) => {
                dispatch
                    .dispatch(&integration, &operation, payload, metadata)
                    .await
            }
            None => Err(PortError::internal(
                "no integration dispatcher configured",
            )),
        };

        match result {
            Ok(response) => {
                instance.set_variables(
                    BTreeMap::from([(result_variable, response.clone())]),
                    metadata,
                )?;
                instance.record_integration_result(
                    &integration,
                    true,
                    serde_json::json!({ "operation": operation, "response": response }),
                    metadata,
                )?;
                Ok(IntegrationOutcome {
                    integration,
                    operation,
                    success: true,
                })
            }
            Err(e) => {
                warn!(
                    workflow_id = %instance.id(),
                    integration = %integration,
                    error = %e,
                    "integration dispatch failed"
                );
                instance.record_integration_result(
                    &integration,
                    false,
                    serde_json::json!({ "operation": operation, "error": e.to_string() }),
                    metadata,
                )?;
                Ok(IntegrationOutcome {
                    integration,
                    operation,
                    success: false,
                })
            }
        }
    }

    /// Assigns the instance to a user or queue
    pub async fn assign(
        &self,
        workflow_id: WorkflowId,
        assignee: &str,
        metadata: &OperationMetadata,
    ) -> Result<WorkflowInstance, WorkflowError> {
        self.mutate(workflow_id, |instance| instance.assign(assignee, metadata))
            .await
    }

    /// Merges values into the instance variables
    pub async fn set_variables(
        &self,
        workflow_id: WorkflowId,
        variables: BTreeMap<String, serde_json::Value>,
        metadata: &OperationMetadata,
    ) -> Result<WorkflowInstance, WorkflowError> {
        self.mutate(workflow_id, |instance| {
            instance.set_variables(variables.clone(), metadata)
        })
        .await
    }

    /// Completes a running workflow
    pub async fn complete_workflow(
        &self,
        workflow_id: WorkflowId,
        outcome: Option<String>,
        metadata: &OperationMetadata,
    ) -> Result<WorkflowInstance, WorkflowError> {
        self.mutate(workflow_id, |instance| {
            instance.complete(outcome.clone(), metadata)
        })
        .await
    }

    /// Fails a workflow with a reason
    pub async fn fail_workflow(
        &self,
        workflow_id: WorkflowId,
        reason: &str,
        metadata: &OperationMetadata,
    ) -> Result<WorkflowInstance, WorkflowError> {
        self.mutate(workflow_id, |instance| instance.fail(reason, metadata))
            .await
    }

    /// Cancels a workflow with a reason
    pub async fn cancel_workflow(
        &self,
        workflow_id: WorkflowId,
        reason: &str,
        metadata: &OperationMetadata,
    ) -> Result<WorkflowInstance, WorkflowError> {
        self.mutate(workflow_id, |instance| instance.cancel(reason, metadata))
            .await
    }

    /// Load-mutate-commit with bounded retry on write races
    async fn mutate<F>(
        &self,
        workflow_id: WorkflowId,
        command: F,
    ) -> Result<WorkflowInstance, WorkflowError>
    where
        F: Fn(&mut WorkflowInstance) -> Result<(), WorkflowError>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut instance = self.store.load(workflow_id).await?;
            command(&mut instance)?;

            match self.store.commit(&mut instance).await {
                Ok(events) => {
                    self.analytics.record(&instance, &events).await;
                    return Ok(instance);
                }
                Err(e) if e.is_concurrency_conflict() && attempt < MAX_COMMIT_ATTEMPTS => {
                    warn!(
                        workflow_id = %workflow_id,
                        attempt,
                        "commit lost a write race, retrying from fresh state"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Builds the rule-evaluation context for an instance
///
/// Variable keys are interpreted as dot paths, so a variable named
/// `patient.age` lands at the nested location rule conditions expect.
/// Workflow metadata is exposed under the `workflow` prefix.
fn build_context(instance: &WorkflowInstance) -> Context {
    let mut context = Context::new();
    for (key, value) in instance.variables() {
        context.set(key, Value::from_json(value));
    }
    context.set("workflow.id", instance.id().to_string());
    context.set("workflow.definition_id", instance.definition_id().to_string());
    context.set("workflow.entity_type", instance.entity_type().to_string());
    context.set("workflow.entity_id", instance.entity_id().to_string());
    if let Some(step) = instance.current_step() {
        context.set("workflow.step", step.to_string());
    }
    context
}
