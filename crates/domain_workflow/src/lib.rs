//! Workflow Domain
//!
//! Event-sourced workflow orchestration for authorization requests, claims,
//! and appeals. The aggregate is a pure in-memory state machine; the event
//! store persists its events with optimistic concurrency; the engine wires
//! rule evaluation and integration dispatch into workflow steps.
//!
//! # Lifecycle
//!
//! ```text
//! Pending -> Running -> { Completed | Failed | Cancelled }
//! ```
//!
//! `Running` transitions to itself as steps complete. Terminal states have
//! no outgoing transitions; instances are retained forever for audit.
//!
//! # Consistency
//!
//! A single workflow instance is updated via strictly serialized event
//! appends guarded by an expected-version check. Different instances are
//! fully independent.

pub mod analytics;
pub mod engine;
pub mod error;
pub mod events;
pub mod instance;
pub mod ports;
pub mod store;

pub use analytics::WorkflowAnalytics;
pub use engine::{IntegrationDispatch, IntegrationOutcome, StepOutcome, WorkflowEngine};
pub use error::WorkflowError;
pub use events::{WorkflowEvent, WorkflowEventKind};
pub use instance::{WorkflowInstance, WorkflowPriority, WorkflowStatus};
pub use ports::{
    EventFilter, InstanceFilter, WorkflowMetric, WorkflowPersistence, WorkflowSnapshot,
};
pub use store::EventStore;
