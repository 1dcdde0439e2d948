//! Workflow domain events
//!
//! Events are the only way a workflow instance changes. Each carries the
//! metadata needed for auditing: who acted, which request chain caused it,
//! and its position (`version`) in the instance's log.
//!
//! # Invariant
//!
//! For a given workflow, versions form a contiguous, gap-free, strictly
//! increasing sequence starting at 0. The event store enforces this via the
//! expected-version check on append.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use core_kernel::{EventId, OperationMetadata, WorkflowId};
use domain_rules::{ActionType, RuleCategory};

use crate::instance::WorkflowPriority;

/// Typed payload of a workflow event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum WorkflowEventKind {
    /// A new workflow instance was started
    Started {
        definition_id: String,
        definition_version: String,
        entity_type: String,
        entity_id: String,
        priority: WorkflowPriority,
        #[serde(default)]
        variables: BTreeMap<String, serde_json::Value>,
    },

    /// The instance was assigned to a user or queue
    Assigned { assignee: String },

    /// The instance moved to the named step
    StepAdvanced {
        from: Option<String>,
        to: String,
    },

    /// Working variables were updated
    VariablesSet {
        variables: BTreeMap<String, serde_json::Value>,
    },

    /// A rule set evaluation produced a decision
    DecisionRecorded {
        category: RuleCategory,
        action: Option<ActionType>,
        confidence: f64,
        recommendation: String,
    },

    /// An integration call finished and its outcome was captured
    IntegrationCompleted {
        integration: String,
        success: bool,
        summary: serde_json::Value,
    },

    /// The workflow finished successfully
    Completed { outcome: Option<String> },

    /// The workflow failed
    Failed { reason: String },

    /// The workflow was cancelled by an explicit request
    Cancelled { reason: String },
}

impl WorkflowEventKind {
    /// Stable name of the event type, for filtering and metrics
    pub fn type_name(&self) -> &'static str {
        match self {
            WorkflowEventKind::Started { .. } => "started",
            WorkflowEventKind::Assigned { .. } => "assigned",
            WorkflowEventKind::StepAdvanced { .. } => "step_advanced",
            WorkflowEventKind::VariablesSet { .. } => "variables_set",
            WorkflowEventKind::DecisionRecorded { .. } => "decision_recorded",
            WorkflowEventKind::IntegrationCompleted { .. } => "integration_completed",
            WorkflowEventKind::Completed { .. } => "completed",
            WorkflowEventKind::Failed { .. } => "failed",
            WorkflowEventKind::Cancelled { .. } => "cancelled",
        }
    }

    /// Whether this event closes the instance
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowEventKind::Completed { .. }
                | WorkflowEventKind::Failed { .. }
                | WorkflowEventKind::Cancelled { .. }
        )
    }
}

/// A persisted workflow event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    /// Unique event identifier (time-ordered)
    pub id: EventId,
    /// Owning workflow instance
    pub workflow_id: WorkflowId,
    /// Typed payload
    pub kind: WorkflowEventKind,
    /// System that produced the event
    pub source: String,
    /// Acting user, if any
    pub user_id: Option<String>,
    /// Ties a request chain together
    pub correlation_id: String,
    /// The event that caused this one, if any
    pub causation_id: Option<EventId>,
    /// Distributed trace identifier
    pub trace_id: String,
    /// Position in this instance's log, starting at 0
    pub version: u64,
    /// When the event was recorded
    pub recorded_at: DateTime<Utc>,
}

impl WorkflowEvent {
    /// Builds an event from a command's metadata
    pub fn new(
        workflow_id: WorkflowId,
        kind: WorkflowEventKind,
        version: u64,
        metadata: &OperationMetadata,
    ) -> Self {
        Self {
            id: EventId::new_v7(),
            workflow_id,
            kind,
            source: metadata.source_system.clone(),
            user_id: metadata.initiated_by.clone(),
            correlation_id: metadata.correlation_id.clone(),
            causation_id: metadata.causation_id,
            trace_id: metadata.trace_id.clone(),
            version,
            recorded_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_carries_command_metadata() {
        let cause = EventId::new();
        let meta = OperationMetadata::new("scheduler")
            .initiated_by("user-7")
            .caused_by(cause);
        let event = WorkflowEvent::new(
            WorkflowId::new(),
            WorkflowEventKind::Assigned {
                assignee: "queue-a".to_string(),
            },
            3,
            &meta,
        );

        assert_eq!(event.source, "scheduler");
        assert_eq!(event.user_id.as_deref(), Some("user-7"));
        assert_eq!(event.correlation_id, meta.correlation_id);
        assert_eq!(event.causation_id, Some(cause));
        assert_eq!(event.version, 3);
    }

    #[test]
    fn test_terminal_events() {
        assert!(WorkflowEventKind::Completed { outcome: None }.is_terminal());
        assert!(WorkflowEventKind::Failed {
            reason: "x".to_string()
        }
        .is_terminal());
        assert!(WorkflowEventKind::Cancelled {
            reason: "x".to_string()
        }
        .is_terminal());
        assert!(!WorkflowEventKind::Assigned {
            assignee: "a".to_string()
        }
        .is_terminal());
    }

    #[test]
    fn test_event_kind_serde_roundtrip() {
        let kind = WorkflowEventKind::DecisionRecorded {
            category: RuleCategory::Eligibility,
            action: Some(ActionType::Approve),
            confidence: 0.95,
            recommendation: "Approve the request automatically".to_string(),
        };
        let json = serde_json::to_string(&kind).unwrap();
        assert!(json.contains("\"event_type\":\"decision_recorded\""));
        let back: WorkflowEventKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, kind);
    }
}
