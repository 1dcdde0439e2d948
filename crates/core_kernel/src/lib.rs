//! Core Kernel - Foundational types and utilities for the careflow system
//!
//! This crate provides the fundamental building blocks used across all domain modules:
//! - Strongly-typed identifiers for workflows, events, rules, and messages
//! - The tagged `Value` union and dot-path `Context` used by rule evaluation
//! - Port abstractions shared by persistence and integration adapters

pub mod context;
pub mod identifiers;
pub mod metadata;
pub mod ports;

pub use context::{Context, Value};
pub use identifiers::{EventId, MessageId, RuleId, WorkflowId};
pub use metadata::OperationMetadata;
pub use ports::{
    AdapterHealth, AuthConfig, HealthCheckResult, PortError,
};
