//! In-memory workflow persistence adapter
//!
//! Keeps event streams, instance read models, snapshots, and metrics in
//! maps behind a single async `RwLock`. Holding one lock across the
//! version check and the write makes `append_events` atomic, which is the
//! whole optimistic-concurrency contract of the port.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use core_kernel::{PortError, WorkflowId};
use domain_workflow::{
    EventFilter, InstanceFilter, WorkflowEvent, WorkflowInstance, WorkflowMetric,
    WorkflowPersistence, WorkflowSnapshot,
};

#[derive(Default)]
struct Inner {
    instances: HashMap<WorkflowId, WorkflowInstance>,
    streams: HashMap<WorkflowId, Vec<WorkflowEvent>>,
    snapshots: HashMap<WorkflowId, WorkflowSnapshot>,
    metrics: Vec<WorkflowMetric>,
}

/// In-memory implementation of [`WorkflowPersistence`]
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    inner: RwLock<Inner>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded metrics, in write order
    pub async fn metrics(&self) -> Vec<WorkflowMetric> {
        self.inner.read().await.metrics.clone()
    }
}

fn matches_instance(instance: &WorkflowInstance, filter: &InstanceFilter) -> bool {
    if let Some(status) = filter.status {
        if instance.status() != status {
            return false;
        }
    }
    if let Some(entity_type) = &filter.entity_type {
        if instance.entity_type() != entity_type {
            return false;
        }
    }
    if let Some(assignee) = &filter.assigned_to {
        if instance.assigned_to() != Some(assignee.as_str()) {
            return false;
        }
    }
    if let Some(after) = filter.created_after {
        if instance.created_at() <= after {
            return false;
        }
    }
    if let Some(before) = filter.created_before {
        if instance.created_at() >= before {
            return false;
        }
    }
    true
}

fn matches_event(event: &WorkflowEvent, filter: &EventFilter) -> bool {
    if let Some(workflow_id) = filter.workflow_id {
        if event.workflow_id != workflow_id {
            return false;
        }
    }
    if let Some(gt) = filter.version_gt {
        if event.version <= gt {
            return false;
        }
    }
    if let Some(lte) = filter.version_lte {
        if event.version > lte {
            return false;
        }
    }
    if let Some(correlation_id) = &filter.correlation_id {
        if &event.correlation_id != correlation_id {
            return false;
        }
    }
    true
}

#[async_trait]
impl WorkflowPersistence for InMemoryWorkflowStore {
    async fn create_instance(&self, instance: &WorkflowInstance) -> Result<(), PortError> {
        let mut inner = self.inner.write().await;
        if inner.instances.contains_key(&instance.id()) {
            return Err(PortError::conflict(format!(
                "workflow instance {} already exists",
                instance.id()
            )));
        }
        inner.instances.insert(instance.id(), instance.clone());
        Ok(())
    }

    async fn update_instance(&self, instance: &WorkflowInstance) -> Result<(), PortError> {
        let mut inner = self.inner.write().await;
        if !inner.instances.contains_key(&instance.id()) {
            return Err(PortError::not_found("workflow_instance", instance.id()));
        }
        inner.instances.insert(instance.id(), instance.clone());
        Ok(())
    }

    async fn find_instance(&self, id: WorkflowId) -> Result<Option<WorkflowInstance>, PortError> {
        Ok(self.inner.read().await.instances.get(&id).cloned())
    }

    async fn list_instances(
        &self,
        filter: &InstanceFilter,
    ) -> Result<Vec<WorkflowInstance>, PortError> {
        let inner = self.inner.read().await;
        let mut matched: Vec<WorkflowInstance> = inner
            .instances
            .values()
            .filter(|i| matches_instance(i, filter))
            .cloned()
            .collect();
        matched.sort_by_key(|i| i.created_at());
        Ok(matched)
    }

    async fn count_instances(&self, filter: &InstanceFilter) -> Result<u64, PortError> {
        let inner = self.inner.read().await;
        Ok(inner
            .instances
            .values()
            .filter(|i| matches_instance(i, filter))
            .count() as u64)
    }

    async fn append_events(
        &self,
        workflow_id: WorkflowId,
        events: &[WorkflowEvent],
        expected_version: u64,
        projection: &WorkflowInstance,
    ) -> Result<(), PortError> {
        let mut inner = self.inner.write().await;
        let stream = inner.streams.entry(workflow_id).or_default();

        let actual = stream.len() as u64;
        if actual != expected_version {
            return Err(PortError::conflict(format!(
                "stream {workflow_id} at version {actual}, append expected {expected_version}"
            )));
        }

        stream.extend_from_slice(events);
        inner.instances.insert(workflow_id, projection.clone());

        debug!(
            workflow_id = %workflow_id,
            appended = events.len(),
            version = actual + events.len() as u64,
            "events appended"
        );
        Ok(())
    }

    async fn find_events(&self, filter: &EventFilter) -> Result<Vec<WorkflowEvent>, PortError> {
        let inner = self.inner.read().await;

        let mut matched: Vec<WorkflowEvent> = match filter.workflow_id {
            // Single-stream reads only scan that stream.
            Some(workflow_id) => inner
                .streams
                .get(&workflow_id)
                .map(|stream| {
                    stream
                        .iter()
                        .filter(|e| matches_event(e, filter))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default(),
            None => inner
                .streams
                .values()
                .flatten()
                .filter(|e| matches_event(e, filter))
                .cloned()
                .collect(),
        };

        matched.sort_by(|a, b| {
            a.workflow_id
                .as_uuid()
                .cmp(b.workflow_id.as_uuid())
                .then(a.version.cmp(&b.version))
        });

        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn stream_version(&self, workflow_id: WorkflowId) -> Result<u64, PortError> {
        let inner = self.inner.read().await;
        Ok(inner
            .streams
            .get(&workflow_id)
            .map(|s| s.len() as u64)
            .unwrap_or(0))
    }

    async fn upsert_snapshot(&self, snapshot: &WorkflowSnapshot) -> Result<(), PortError> {
        let mut inner = self.inner.write().await;
        inner
            .snapshots
            .insert(snapshot.workflow_id, snapshot.clone());
        Ok(())
    }

    async fn find_snapshot(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Option<WorkflowSnapshot>, PortError> {
        Ok(self.inner.read().await.snapshots.get(&workflow_id).cloned())
    }

    async fn create_metric(&self, metric: &WorkflowMetric) -> Result<(), PortError> {
        self.inner.write().await.metrics.push(metric.clone());
        Ok(())
    }
}
