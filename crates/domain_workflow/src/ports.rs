//! Persistence port for workflow instances, events, and snapshots
//!
//! Storage adapters implement `WorkflowPersistence`; the domain layer only
//! sees this trait. The event log is the source of truth - the instance
//! records kept alongside it are a denormalized read model for queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{PortError, WorkflowId};

use crate::events::WorkflowEvent;
use crate::instance::{WorkflowInstance, WorkflowStatus};

/// Query filter for instance listings
#[derive(Debug, Clone, Default)]
pub struct InstanceFilter {
    pub status: Option<WorkflowStatus>,
    pub entity_type: Option<String>,
    pub assigned_to: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

/// Query filter for the event log
///
/// Matching events are always returned in ascending version order.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub workflow_id: Option<WorkflowId>,
    /// Only events with version strictly greater than this
    pub version_gt: Option<u64>,
    /// Only events with version less than or equal to this
    pub version_lte: Option<u64>,
    pub correlation_id: Option<String>,
    pub limit: Option<usize>,
}

impl EventFilter {
    /// All events of one workflow stream
    pub fn for_workflow(workflow_id: WorkflowId) -> Self {
        Self {
            workflow_id: Some(workflow_id),
            ..Default::default()
        }
    }

    /// Events of one stream after the given version
    pub fn after_version(workflow_id: WorkflowId, version: u64) -> Self {
        Self {
            workflow_id: Some(workflow_id),
            version_gt: Some(version),
            ..Default::default()
        }
    }
}

/// Point-in-time serialized aggregate state
///
/// Snapshots are an optimization only; deleting every snapshot loses no
/// information because the event log remains complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub workflow_id: WorkflowId,
    /// Version of the state captured (number of events applied)
    pub version: u64,
    pub state: serde_json::Value,
    pub taken_at: DateTime<Utc>,
}

/// One analytics measurement emitted by the workflow side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowMetric {
    pub workflow_id: WorkflowId,
    pub definition_id: String,
    pub name: String,
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Storage port for workflow state
#[async_trait]
pub trait WorkflowPersistence: Send + Sync {
    /// Persists a brand-new instance read model
    async fn create_instance(&self, instance: &WorkflowInstance) -> Result<(), PortError>;

    /// Replaces the read model of an existing instance
    async fn update_instance(&self, instance: &WorkflowInstance) -> Result<(), PortError>;

    /// Looks up one instance read model
    async fn find_instance(&self, id: WorkflowId) -> Result<Option<WorkflowInstance>, PortError>;

    /// Lists instance read models matching the filter
    async fn list_instances(
        &self,
        filter: &InstanceFilter,
    ) -> Result<Vec<WorkflowInstance>, PortError>;

    /// Counts instance read models matching the filter
    async fn count_instances(&self, filter: &InstanceFilter) -> Result<u64, PortError>;

    /// Appends events to one stream with optimistic concurrency
    ///
    /// `expected_version` must equal the current stream length; otherwise
    /// the adapter returns `PortError::Conflict` and writes nothing. The
    /// events and the updated `projection` read model are stored in the
    /// same atomic step.
    async fn append_events(
        &self,
        workflow_id: WorkflowId,
        events: &[WorkflowEvent],
        expected_version: u64,
        projection: &WorkflowInstance,
    ) -> Result<(), PortError>;

    /// Reads events matching the filter in ascending version order
    async fn find_events(&self, filter: &EventFilter) -> Result<Vec<WorkflowEvent>, PortError>;

    /// Current stream length (number of committed events)
    async fn stream_version(&self, workflow_id: WorkflowId) -> Result<u64, PortError>;

    /// Stores a snapshot, replacing any older one for the same stream
    async fn upsert_snapshot(&self, snapshot: &WorkflowSnapshot) -> Result<(), PortError>;

    /// Most recent snapshot for a stream, if any
    async fn find_snapshot(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Option<WorkflowSnapshot>, PortError>;

    /// Records one analytics measurement
    async fn create_metric(&self, metric: &WorkflowMetric) -> Result<(), PortError>;
}
