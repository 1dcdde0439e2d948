//! Storage Adapters
//!
//! In-memory implementations of the domain storage ports:
//!
//! - [`InMemoryWorkflowStore`] - event streams, instance read models,
//!   snapshots, and metrics behind [`domain_workflow::WorkflowPersistence`]
//! - [`InMemoryRuleStore`] - business rules behind
//!   [`domain_rules::RuleStore`], preserving insertion order
//!
//! Both adapters are the production defaults for single-node deployments
//! and the backing stores used by the test suites. A database-backed
//! adapter would implement the same ports.

pub mod memory;
pub mod rules;

pub use memory::InMemoryWorkflowStore;
pub use rules::InMemoryRuleStore;
