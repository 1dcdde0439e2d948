//! Analytics sink for committed workflow events
//!
//! Derives operational measurements from event batches and records them
//! through the persistence port. Analytics are best-effort: a failed metric
//! write is logged and never fails the workflow operation that produced it.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::events::{WorkflowEvent, WorkflowEventKind};
use crate::instance::WorkflowInstance;
use crate::ports::{WorkflowMetric, WorkflowPersistence};

pub struct WorkflowAnalytics<P> {
    persistence: Arc<P>,
}

impl<P: WorkflowPersistence> WorkflowAnalytics<P> {
    pub fn new(persistence: Arc<P>) -> Self {
        Self { persistence }
    }

    /// Derives and records metrics for a freshly committed event batch
    pub async fn record(&self, instance: &WorkflowInstance, events: &[WorkflowEvent]) {
        for event in events {
            match &event.kind {
                WorkflowEventKind::DecisionRecorded {
                    category,
                    confidence,
                    ..
                } => {
                    self.emit(
                        instance,
                        format!("decision_confidence.{:?}", category).to_lowercase(),
                        *confidence,
                    )
                    .await;
                }
                WorkflowEventKind::IntegrationCompleted { success, .. } => {
                    self.emit(
                        instance,
                        "integration_success".to_string(),
                        if *success { 1.0 } else { 0.0 },
                    )
                    .await;
                }
                kind if kind.is_terminal() => {
                    let finished = instance.finished_at().unwrap_or(event.recorded_at);
                    let duration = (finished - instance.created_at()).num_milliseconds();
                    self.emit(
                        instance,
                        "duration_ms".to_string(),
                        duration.max(0) as f64,
                    )
                    .await;
                    self.emit(instance, "event_count".to_string(), instance.version() as f64)
                        .await;
                }
                _ => {}
            }
        }
    }

    async fn emit(&self, instance: &WorkflowInstance, name: String, value: f64) {
        let metric = WorkflowMetric {
            workflow_id: instance.id(),
            definition_id: instance.definition_id().to_string(),
            name,
            value,
            recorded_at: Utc::now(),
        };

        match self.persistence.create_metric(&metric).await {
            Ok(()) => debug!(
                workflow_id = %metric.workflow_id,
                metric = %metric.name,
                value = metric.value,
                "recorded workflow metric"
            ),
            Err(e) => warn!(
                workflow_id = %metric.workflow_id,
                metric = %metric.name,
                error = %e,
                "metric write failed"
            ),
        }
    }
}
