//! Workflow domain errors

use thiserror::Error;

use core_kernel::{PortError, WorkflowId};

/// Errors raised by the workflow aggregate, store, and engine
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A command is not valid in the instance's current state
    #[error("Invalid transition: cannot {command} while {from}")]
    InvalidTransition { from: String, command: String },

    /// An append's expected version did not match the store's current version
    ///
    /// Never retried by the store itself; callers must reload and decide.
    #[error("Concurrency conflict: expected version {expected}, store is at {actual}")]
    ConcurrencyConflict { expected: u64, actual: u64 },

    /// The workflow instance does not exist
    #[error("Workflow not found: {0}")]
    NotFound(WorkflowId),

    /// The persisted event stream is unusable
    #[error("Corrupt event stream: {0}")]
    CorruptStream(String),

    /// The persistence collaborator failed
    #[error("Persistence error: {0}")]
    Persistence(#[from] PortError),

    /// Snapshot state could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WorkflowError {
    /// Returns true for the expected-version rejection
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, WorkflowError::ConcurrencyConflict { .. })
    }
}
