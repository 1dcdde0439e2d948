//! Event store built over the [`WorkflowPersistence`] port
//!
//! Wraps a storage adapter with the event-sourcing mechanics the aggregate
//! expects: optimistic-concurrency commits of the uncommitted buffer,
//! stream loading through snapshot-plus-replay, and periodic snapshot
//! capture.

use std::sync::Arc;

use tracing::{debug, warn};

use core_kernel::{PortError, WorkflowId};

use crate::error::WorkflowError;
use crate::events::WorkflowEvent;
use crate::instance::WorkflowInstance;
use crate::ports::{EventFilter, WorkflowPersistence, WorkflowSnapshot};

/// Take a snapshot once a stream grows by this many events
const DEFAULT_SNAPSHOT_CADENCE: u64 = 50;

/// Event-sourced persistence facade for workflow instances
pub struct EventStore<P> {
    persistence: Arc<P>,
    snapshot_cadence: u64,
}

impl<P> Clone for EventStore<P> {
    fn clone(&self) -> Self {
        Self {
            persistence: Arc::clone(&self.persistence),
            snapshot_cadence: self.snapshot_cadence,
        }
    }
}

impl<P: WorkflowPersistence> EventStore<P> {
    pub fn new(persistence: Arc<P>) -> Self {
        Self {
            persistence,
            snapshot_cadence: DEFAULT_SNAPSHOT_CADENCE,
        }
    }

    /// Overrides how often snapshots are taken (in events)
    pub fn with_snapshot_cadence(mut self, cadence: u64) -> Self {
        self.snapshot_cadence = cadence.max(1);
        self
    }

    pub fn persistence(&self) -> &Arc<P> {
        &self.persistence
    }

    /// Commits the aggregate's uncommitted events
    ///
    /// The append asserts that the stream still has exactly the length the
    /// aggregate saw when it was loaded; a concurrent writer raises
    /// [`WorkflowError::ConcurrencyConflict`] and nothing is written. The
    /// instance read model is stored in the same atomic step as the events.
    ///
    /// Returns the committed events so callers can fan them out.
    pub async fn commit(
        &self,
        instance: &mut WorkflowInstance,
    ) -> Result<Vec<WorkflowEvent>, WorkflowError> {
        let events = instance.take_events();
        if events.is_empty() {
            return Ok(events);
        }

        let workflow_id = instance.id();
        let expected_version = events[0].version;

        let result = self
            .persistence
            .append_events(workflow_id, &events, expected_version, instance)
            .await;

        match result {
            Ok(()) => {}
            Err(PortError::Conflict { .. }) => {
                let actual = self
                    .persistence
                    .stream_version(workflow_id)
                    .await
                    .unwrap_or(expected_version);
                warn!(
                    workflow_id = %workflow_id,
                    expected = expected_version,
                    actual,
                    "concurrent write detected, commit rejected"
                );
                return Err(WorkflowError::ConcurrencyConflict {
                    expected: expected_version,
                    actual,
                });
            }
            Err(e) => return Err(e.into()),
        }

        debug!(
            workflow_id = %workflow_id,
            count = events.len(),
            version = instance.version(),
            "committed workflow events"
        );

        self.maybe_snapshot(instance, expected_version).await;

        Ok(events)
    }

    /// Loads an instance by snapshot-plus-replay
    ///
    /// Falls back to full replay when no snapshot exists or the stored
    /// snapshot fails to deserialize.
    pub async fn load(&self, workflow_id: WorkflowId) -> Result<WorkflowInstance, WorkflowError> {
        if let Some(snapshot) = self.persistence.find_snapshot(workflow_id).await? {
            match serde_json::from_value::<WorkflowInstance>(snapshot.state.clone()) {
                Ok(mut instance) => {
                    let tail = self
                        .persistence
                        .find_events(&EventFilter::after_version(
                            workflow_id,
                            snapshot.version.saturating_sub(1),
                        ))
                        .await?;
                    for event in &tail {
                        instance.apply_committed(event)?;
                    }
                    return Ok(instance);
                }
                Err(e) => {
                    warn!(
                        workflow_id = %workflow_id,
                        error = %e,
                        "snapshot deserialization failed, replaying full stream"
                    );
                }
            }
        }

        let events = self
            .persistence
            .find_events(&EventFilter::for_workflow(workflow_id))
            .await?;
        if events.is_empty() {
            return Err(WorkflowError::NotFound(workflow_id));
        }
        WorkflowInstance::replay(&events)
    }

    /// Reads the committed event history of a stream
    pub async fn history(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Vec<WorkflowEvent>, WorkflowError> {
        Ok(self
            .persistence
            .find_events(&EventFilter::for_workflow(workflow_id))
            .await?)
    }

    /// Takes a snapshot when the commit crossed a cadence boundary
    ///
    /// Snapshot failures are logged and swallowed; the event log already
    /// holds the committed truth.
    async fn maybe_snapshot(&self, instance: &WorkflowInstance, previous_version: u64) {
        let crossed = instance.version() / self.snapshot_cadence
            > previous_version / self.snapshot_cadence;
        if !crossed {
            return;
        }

        let state = match serde_json::to_value(instance) {
            Ok(state) => state,
            Err(e) => {
                warn!(workflow_id = %instance.id(), error = %e, "snapshot serialization failed");
                return;
            }
        };

        let snapshot = WorkflowSnapshot {
            workflow_id: instance.id(),
            version: instance.version(),
            state,
            taken_at: chrono::Utc::now(),
        };

        if let Err(e) = self.persistence.upsert_snapshot(&snapshot).await {
            warn!(workflow_id = %instance.id(), error = %e, "snapshot write failed");
        } else {
            debug!(
                workflow_id = %instance.id(),
                version = instance.version(),
                "snapshot taken"
            );
        }
    }
}
