//! Operation metadata for auditing and tracing
//!
//! Every command entering the workflow core carries metadata tying it to the
//! request chain that caused it. Events persisted by the event store copy
//! these fields so a trace can be followed across workflow, rule, and
//! integration boundaries.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identifiers::EventId;

/// Metadata describing who initiated an operation and how to correlate it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationMetadata {
    /// Correlation ID tying a request chain together
    pub correlation_id: String,
    /// The event that caused this operation, if any
    pub causation_id: Option<EventId>,
    /// Distributed trace identifier
    pub trace_id: String,
    /// User or system that initiated the operation
    pub initiated_by: Option<String>,
    /// Source system identifier
    pub source_system: String,
}

impl OperationMetadata {
    /// Creates metadata for a fresh request chain
    pub fn new(source_system: impl Into<String>) -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            causation_id: None,
            trace_id: Uuid::new_v4().to_string(),
            initiated_by: None,
            source_system: source_system.into(),
        }
    }

    /// Creates metadata continuing an existing correlation
    pub fn with_correlation_id(
        source_system: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            ..Self::new(source_system)
        }
    }

    /// Sets the initiating user
    pub fn initiated_by(mut self, user_id: impl Into<String>) -> Self {
        self.initiated_by = Some(user_id.into());
        self
    }

    /// Derives metadata for an operation caused by an existing event
    ///
    /// Correlation and trace ids are carried forward; the causation id is
    /// replaced with the causing event.
    pub fn caused_by(&self, event_id: EventId) -> Self {
        Self {
            causation_id: Some(event_id),
            ..self.clone()
        }
    }
}

impl Default for OperationMetadata {
    fn default() -> Self {
        Self::new("careflow")
    }
}
