//! Pre-built Test Fixtures
//!
//! Provides ready-to-use test data for common entities across the workflow
//! and rules engines. These fixtures are designed to be consistent and
//! predictable for unit tests.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use core_kernel::{Context, OperationMetadata, RuleId, Value, WorkflowId};
use serde_json::json;
use uuid::Uuid;

/// Fixture for identifier test data
pub struct IdFixtures;

impl IdFixtures {
    /// Creates a deterministic workflow ID for testing
    pub fn workflow_id() -> WorkflowId {
        WorkflowId::from_uuid(Uuid::parse_str("550e8400-e29b-41d4-a716-446655440001").unwrap())
    }

    /// Creates a deterministic rule ID for testing
    pub fn rule_id() -> RuleId {
        RuleId::from_uuid(Uuid::parse_str("550e8400-e29b-41d4-a716-446655440002").unwrap())
    }
}

/// Fixture for temporal test data
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// Standard rule effective date (Jan 1, 2024)
    pub fn effective_from() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    /// Standard rule expiry date (Dec 31, 2024)
    pub fn effective_until() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap()
    }

    /// Mid-window timestamp for applicability tests
    pub fn mid_window() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    /// Pre-window timestamp
    pub fn before_window() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap()
    }

    /// Post-window timestamp
    pub fn after_window() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap()
    }
}

/// Fixture for operation metadata
pub struct MetadataFixtures;

impl MetadataFixtures {
    /// Metadata originating from the test harness itself
    pub fn system() -> OperationMetadata {
        OperationMetadata::new("test-harness")
    }

    /// Metadata attributed to a named reviewer
    pub fn reviewer(name: &str) -> OperationMetadata {
        let mut metadata = OperationMetadata::new("test-harness");
        metadata.initiated_by = Some(name.to_string());
        metadata
    }
}

/// Fixture for evaluation contexts
pub struct ContextFixtures;

impl ContextFixtures {
    /// A senior patient requesting an imaging procedure
    pub fn senior_imaging_patient() -> Context {
        let mut context = Context::new();
        context.set("patient.age", Value::from(72i64));
        context.set("patient.state", Value::from("CA"));
        context.set("procedure.code", Value::from("70551"));
        context.set("procedure.category", Value::from("imaging"));
        context.set("coverage.active", Value::from(true));
        context
    }

    /// A routine adult patient with active coverage
    pub fn routine_patient() -> Context {
        let mut context = Context::new();
        context.set("patient.age", Value::from(34i64));
        context.set("patient.state", Value::from("WA"));
        context.set("procedure.code", Value::from("99213"));
        context.set("procedure.category", Value::from("office_visit"));
        context.set("coverage.active", Value::from(true));
        context
    }
}

/// Fixture for workflow variables
pub struct VariableFixtures;

impl VariableFixtures {
    /// Starting variables for a prior-authorization workflow
    pub fn prior_auth() -> BTreeMap<String, serde_json::Value> {
        BTreeMap::from([
            ("patient.age".to_string(), json!(72)),
            ("patient.member_id".to_string(), json!("MBR-1001")),
            ("procedure.code".to_string(), json!("70551")),
            ("coverage.active".to_string(), json!(true)),
        ])
    }

    /// Starting variables for a claim-review workflow
    pub fn claim_review() -> BTreeMap<String, serde_json::Value> {
        BTreeMap::from([
            ("claim.number".to_string(), json!("CLM-2024-0001")),
            ("claim.billed_amount".to_string(), json!(1250.00)),
            ("claim.diagnosis".to_string(), json!("M54.5")),
        ])
    }
}
