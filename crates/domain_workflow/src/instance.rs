//! Workflow Instance Aggregate Root
//!
//! One `WorkflowInstance` is one in-progress execution of a workflow
//! definition against a specific business entity (an authorization request,
//! a claim, an appeal). It is the consistency boundary for that execution.
//!
//! # Event sourcing
//!
//! The aggregate is a pure in-memory object. Commands validate the current
//! state, then raise domain events into an uncommitted buffer and apply
//! them through the same `apply` used during replay - so replayed history
//! and freshly-issued commands travel identical code paths, and the
//! aggregate stays free of storage dependencies.
//!
//! # Invariants
//!
//! - Terminal states (Completed/Failed/Cancelled) accept no commands
//! - `version` equals the number of events applied to this state
//! - Instances are never deleted; they are retained for audit

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use core_kernel::{OperationMetadata, WorkflowId};
use domain_rules::{ActionType, RuleCategory};

use crate::error::WorkflowError;
use crate::events::{WorkflowEvent, WorkflowEventKind};

/// Workflow lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Started but no step has begun
    Pending,
    /// Actively moving through steps
    Running,
    /// Finished successfully
    Completed,
    /// Finished with a failure
    Failed,
    /// Cancelled by an explicit request
    Cancelled,
}

impl WorkflowStatus {
    /// Whether this status has no outgoing transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

/// Processing priority of a workflow instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Default for WorkflowPriority {
    fn default() -> Self {
        WorkflowPriority::Normal
    }
}

/// The workflow instance aggregate root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInstance {
    /// Unique instance identifier
    id: WorkflowId,
    /// Workflow definition this instance executes
    definition_id: String,
    /// Version of the definition at start time
    definition_version: String,
    /// Kind of business entity being processed
    entity_type: String,
    /// Identifier of the business entity
    entity_id: String,
    /// Current lifecycle status
    status: WorkflowStatus,
    /// Name of the step currently in progress
    current_step: Option<String>,
    /// Mutable working set visible to rule evaluation
    variables: BTreeMap<String, serde_json::Value>,
    /// User or queue the instance is assigned to
    assigned_to: Option<String>,
    /// Processing priority
    priority: WorkflowPriority,
    /// Number of events applied to this state
    version: u64,
    /// Creation timestamp
    created_at: DateTime<Utc>,
    /// Last update timestamp
    updated_at: DateTime<Utc>,
    /// When the first step began
    started_at: Option<DateTime<Utc>>,
    /// When a terminal event closed the instance
    finished_at: Option<DateTime<Utc>>,
    /// Events raised but not yet committed to the store
    #[serde(skip)]
    uncommitted: Vec<WorkflowEvent>,
}

impl WorkflowInstance {
    /// Starts a new workflow instance
    ///
    /// Raises the `Started` event; the instance begins in `Pending`.
    pub fn start(
        definition_id: impl Into<String>,
        definition_version: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        priority: WorkflowPriority,
        variables: BTreeMap<String, serde_json::Value>,
        metadata: &OperationMetadata,
    ) -> Self {
        let mut instance = Self {
            id: WorkflowId::new_v7(),
            definition_id: String::new(),
            definition_version: String::new(),
            entity_type: String::new(),
            entity_id: String::new(),
            status: WorkflowStatus::Pending,
            current_step: None,
            variables: BTreeMap::new(),
            assigned_to: None,
            priority: WorkflowPriority::Normal,
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            started_at: None,
            finished_at: None,
            uncommitted: Vec::new(),
        };

        instance.raise(
            WorkflowEventKind::Started {
                definition_id: definition_id.into(),
                definition_version: definition_version.into(),
                entity_type: entity_type.into(),
                entity_id: entity_id.into(),
                priority,
                variables,
            },
            metadata,
        );

        instance
    }

    /// Rebuilds an instance by replaying its committed events
    ///
    /// The first event must be `Started`.
    pub fn replay(events: &[WorkflowEvent]) -> Result<Self, WorkflowError> {
        let first = events
            .first()
            .ok_or_else(|| WorkflowError::CorruptStream("empty event stream".to_string()))?;
        if !matches!(first.kind, WorkflowEventKind::Started { .. }) {
            return Err(WorkflowError::CorruptStream(format!(
                "stream starts with '{}', expected 'started'",
                first.kind.type_name()
            )));
        }

        let mut instance = Self {
            id: first.workflow_id,
            definition_id: String::new(),
            definition_version: String::new(),
            entity_type: String::new(),
            entity_id: String::new(),
            status: WorkflowStatus::Pending,
            current_step: None,
            variables: BTreeMap::new(),
            assigned_to: None,
            priority: WorkflowPriority::Normal,
            version: 0,
            created_at: first.recorded_at,
            updated_at: first.recorded_at,
            started_at: None,
            finished_at: None,
            uncommitted: Vec::new(),
        };

        for event in events {
            instance.apply_committed(event)?;
        }

        Ok(instance)
    }

    /// Applies one committed event to this state
    ///
    /// Used by replay and by the store when catching a snapshot up to the
    /// head of the log.
    pub fn apply_committed(&mut self, event: &WorkflowEvent) -> Result<(), WorkflowError> {
        if event.version != self.version {
            return Err(WorkflowError::CorruptStream(format!(
                "event version {} applied to state at version {}",
                event.version, self.version
            )));
        }
        self.apply(&event.kind, event.recorded_at);
        self.version += 1;
        self.updated_at = event.recorded_at;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Assigns the instance to a user or queue
    pub fn assign(
        &mut self,
        assignee: impl Into<String>,
        metadata: &OperationMetadata,
    ) -> Result<(), WorkflowError> {
        self.ensure_open("assign")?;
        self.raise(
            WorkflowEventKind::Assigned {
                assignee: assignee.into(),
            },
            metadata,
        );
        Ok(())
    }

    /// Moves the instance to the named step
    ///
    /// The first step transitions `Pending -> Running`; later steps keep the
    /// instance in `Running`.
    pub fn advance_step(
        &mut self,
        step: impl Into<String>,
        metadata: &OperationMetadata,
    ) -> Result<(), WorkflowError> {
        self.ensure_open("advance_step")?;
        self.raise(
            WorkflowEventKind::StepAdvanced {
                from: self.current_step.clone(),
                to: step.into(),
            },
            metadata,
        );
        Ok(())
    }

    /// Merges values into the working variable set
    pub fn set_variables(
        &mut self,
        variables: BTreeMap<String, serde_json::Value>,
        metadata: &OperationMetadata,
    ) -> Result<(), WorkflowError> {
        self.ensure_open("set_variables")?;
        self.raise(WorkflowEventKind::VariablesSet { variables }, metadata);
        Ok(())
    }

    /// Records the outcome of a rule set evaluation
    pub fn record_decision(
        &mut self,
        category: RuleCategory,
        action: Option<ActionType>,
        confidence: f64,
        recommendation: impl Into<String>,
        metadata: &OperationMetadata,
    ) -> Result<(), WorkflowError> {
        self.ensure_running("record_decision")?;
        self.raise(
            WorkflowEventKind::DecisionRecorded {
                category,
                action,
                confidence,
                recommendation: recommendation.into(),
            },
            metadata,
        );
        Ok(())
    }

    /// Records the outcome of an integration call
    pub fn record_integration_result(
        &mut self,
        integration: impl Into<String>,
        success: bool,
        summary: serde_json::Value,
        metadata: &OperationMetadata,
    ) -> Result<(), WorkflowError> {
        self.ensure_running("record_integration_result")?;
        self.raise(
            WorkflowEventKind::IntegrationCompleted {
                integration: integration.into(),
                success,
                summary,
            },
            metadata,
        );
        Ok(())
    }

    /// Completes the workflow
    pub fn complete(
        &mut self,
        outcome: Option<String>,
        metadata: &OperationMetadata,
    ) -> Result<(), WorkflowError> {
        self.ensure_running("complete")?;
        self.raise(WorkflowEventKind::Completed { outcome }, metadata);
        Ok(())
    }

    /// Fails the workflow
    pub fn fail(
        &mut self,
        reason: impl Into<String>,
        metadata: &OperationMetadata,
    ) -> Result<(), WorkflowError> {
        self.ensure_open("fail")?;
        self.raise(
            WorkflowEventKind::Failed {
                reason: reason.into(),
            },
            metadata,
        );
        Ok(())
    }

    /// Cancels the workflow
    ///
    /// Cancellation only ever happens through this explicit command; no
    /// background timer force-cancels an instance.
    pub fn cancel(
        &mut self,
        reason: impl Into<String>,
        metadata: &OperationMetadata,
    ) -> Result<(), WorkflowError> {
        self.ensure_open("cancel")?;
        self.raise(
            WorkflowEventKind::Cancelled {
                reason: reason.into(),
            },
            metadata,
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Event handling
    // ------------------------------------------------------------------

    fn raise(&mut self, kind: WorkflowEventKind, metadata: &OperationMetadata) {
        let event = WorkflowEvent::new(self.id, kind.clone(), self.version, metadata);
        let recorded_at = event.recorded_at;
        self.apply(&kind, recorded_at);
        self.version += 1;
        self.updated_at = recorded_at;
        self.uncommitted.push(event);
    }

    fn apply(&mut self, kind: &WorkflowEventKind, at: DateTime<Utc>) {
        match kind {
            WorkflowEventKind::Started {
                definition_id,
                definition_version,
                entity_type,
                entity_id,
                priority,
                variables,
            } => {
                self.definition_id = definition_id.clone();
                self.definition_version = definition_version.clone();
                self.entity_type = entity_type.clone();
                self.entity_id = entity_id.clone();
                self.priority = *priority;
                self.variables = variables.clone();
                self.status = WorkflowStatus::Pending;
            }
            WorkflowEventKind::Assigned { assignee } => {
                self.assigned_to = Some(assignee.clone());
            }
            WorkflowEventKind::StepAdvanced { to, .. } => {
                if self.status == WorkflowStatus::Pending {
                    self.status = WorkflowStatus::Running;
                    self.started_at = Some(at);
                }
                self.current_step = Some(to.clone());
            }
            WorkflowEventKind::VariablesSet { variables } => {
                self.variables.extend(variables.clone());
            }
            WorkflowEventKind::DecisionRecorded { .. }
            | WorkflowEventKind::IntegrationCompleted { .. } => {
                // Audit-only events; the engine feeds results back through
                // VariablesSet so replay stays deterministic.
            }
            WorkflowEventKind::Completed { .. } => {
                self.status = WorkflowStatus::Completed;
                self.finished_at = Some(at);
            }
            WorkflowEventKind::Failed { .. } => {
                self.status = WorkflowStatus::Failed;
                self.finished_at = Some(at);
            }
            WorkflowEventKind::Cancelled { .. } => {
                self.status = WorkflowStatus::Cancelled;
                self.finished_at = Some(at);
            }
        }
    }

    fn ensure_open(&self, command: &str) -> Result<(), WorkflowError> {
        if self.status.is_terminal() {
            return Err(WorkflowError::InvalidTransition {
                from: format!("{:?}", self.status),
                command: command.to_string(),
            });
        }
        Ok(())
    }

    fn ensure_running(&self, command: &str) -> Result<(), WorkflowError> {
        if self.status != WorkflowStatus::Running {
            return Err(WorkflowError::InvalidTransition {
                from: format!("{:?}", self.status),
                command: command.to_string(),
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Returns the instance ID
    pub fn id(&self) -> WorkflowId {
        self.id
    }

    /// Returns the workflow definition ID
    pub fn definition_id(&self) -> &str {
        &self.definition_id
    }

    /// Returns the definition version
    pub fn definition_version(&self) -> &str {
        &self.definition_version
    }

    /// Returns the processed entity's type
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Returns the processed entity's ID
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Returns the current status
    pub fn status(&self) -> WorkflowStatus {
        self.status
    }

    /// Returns the current step name
    pub fn current_step(&self) -> Option<&str> {
        self.current_step.as_deref()
    }

    /// Returns the working variables
    pub fn variables(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.variables
    }

    /// Returns the assignee
    pub fn assigned_to(&self) -> Option<&str> {
        self.assigned_to.as_deref()
    }

    /// Returns the priority
    pub fn priority(&self) -> WorkflowPriority {
        self.priority
    }

    /// Number of events applied to this state (committed + uncommitted)
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Version of the last committed event batch
    ///
    /// This is the expected version a commit of the uncommitted buffer must
    /// assert against the store.
    pub fn committed_version(&self) -> u64 {
        self.version - self.uncommitted.len() as u64
    }

    /// Returns creation time
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the first step began
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Returns when the instance reached a terminal state
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Events raised but not yet committed
    pub fn uncommitted_events(&self) -> &[WorkflowEvent] {
        &self.uncommitted
    }

    /// Returns accumulated uncommitted events and clears the buffer
    pub fn take_events(&mut self) -> Vec<WorkflowEvent> {
        std::mem::take(&mut self.uncommitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> OperationMetadata {
        OperationMetadata::new("test")
    }

    fn start_instance() -> WorkflowInstance {
        WorkflowInstance::start(
            "prior-auth",
            "3",
            "authorization_request",
            "AUTH-001",
            WorkflowPriority::High,
            BTreeMap::new(),
            &meta(),
        )
    }

    #[test]
    fn test_start_raises_started_event() {
        let instance = start_instance();
        assert_eq!(instance.status(), WorkflowStatus::Pending);
        assert_eq!(instance.version(), 1);
        assert_eq!(instance.committed_version(), 0);

        let events = instance.uncommitted_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].version, 0);
        assert!(matches!(events[0].kind, WorkflowEventKind::Started { .. }));
    }

    #[test]
    fn test_first_step_moves_pending_to_running() {
        let mut instance = start_instance();
        instance.advance_step("eligibility_check", &meta()).unwrap();

        assert_eq!(instance.status(), WorkflowStatus::Running);
        assert_eq!(instance.current_step(), Some("eligibility_check"));
        assert!(instance.started_at().is_some());
    }

    #[test]
    fn test_running_may_advance_repeatedly() {
        let mut instance = start_instance();
        instance.advance_step("step-1", &meta()).unwrap();
        instance.advance_step("step-2", &meta()).unwrap();
        instance.advance_step("step-3", &meta()).unwrap();

        assert_eq!(instance.status(), WorkflowStatus::Running);
        assert_eq!(instance.current_step(), Some("step-3"));
        assert_eq!(instance.version(), 4);
    }

    #[test]
    fn test_terminal_states_reject_commands() {
        let mut instance = start_instance();
        instance.advance_step("review", &meta()).unwrap();
        instance.complete(Some("approved".to_string()), &meta()).unwrap();

        let result = instance.advance_step("another", &meta());
        assert!(matches!(
            result,
            Err(WorkflowError::InvalidTransition { .. })
        ));
        let result = instance.cancel("too late", &meta());
        assert!(matches!(
            result,
            Err(WorkflowError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_decision_requires_running() {
        let mut instance = start_instance();
        let result = instance.record_decision(
            RuleCategory::Eligibility,
            Some(ActionType::Approve),
            1.0,
            "Approve the request automatically",
            &meta(),
        );
        assert!(matches!(
            result,
            Err(WorkflowError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_cancel_from_pending() {
        let mut instance = start_instance();
        instance.cancel("superseded", &meta()).unwrap();
        assert_eq!(instance.status(), WorkflowStatus::Cancelled);
        assert!(instance.finished_at().is_some());
    }

    #[test]
    fn test_event_versions_are_contiguous_from_zero() {
        let mut instance = start_instance();
        instance.assign("reviewer-1", &meta()).unwrap();
        instance.advance_step("review", &meta()).unwrap();
        instance
            .set_variables(
                BTreeMap::from([("claim.amount".to_string(), serde_json::json!(1200))]),
                &meta(),
            )
            .unwrap();

        let versions: Vec<u64> = instance
            .uncommitted_events()
            .iter()
            .map(|e| e.version)
            .collect();
        assert_eq!(versions, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_replay_reproduces_state() {
        let mut original = start_instance();
        original.assign("reviewer-9", &meta()).unwrap();
        original.advance_step("clinical_review", &meta()).unwrap();
        original
            .set_variables(
                BTreeMap::from([("flag".to_string(), serde_json::json!(true))]),
                &meta(),
            )
            .unwrap();
        original.complete(None, &meta()).unwrap();

        let events = original.take_events();
        let replayed = WorkflowInstance::replay(&events).unwrap();

        assert_eq!(replayed.id(), original.id());
        assert_eq!(replayed.status(), original.status());
        assert_eq!(replayed.current_step(), original.current_step());
        assert_eq!(replayed.variables(), original.variables());
        assert_eq!(replayed.assigned_to(), original.assigned_to());
        assert_eq!(replayed.version(), original.version());
    }

    #[test]
    fn test_replay_rejects_headless_stream() {
        let mut instance = start_instance();
        instance.advance_step("review", &meta()).unwrap();
        let events = instance.take_events();

        // Drop the Started event.
        let result = WorkflowInstance::replay(&events[1..]);
        assert!(matches!(result, Err(WorkflowError::CorruptStream(_))));
    }

    #[test]
    fn test_take_events_clears_buffer() {
        let mut instance = start_instance();
        assert_eq!(instance.take_events().len(), 1);
        assert!(instance.uncommitted_events().is_empty());
        assert_eq!(instance.committed_version(), 1);
    }
}
