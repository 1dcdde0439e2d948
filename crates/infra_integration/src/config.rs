//! Per-integration configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use core_kernel::AuthConfig;

use crate::mapping::FieldMapping;
use crate::retry::RetryPolicy;

/// Wire protocol an integration speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationType {
    /// FHIR REST/JSON
    Fhir,
    /// HL7 v2 segment messages
    Hl7,
    /// ANSI X12 005010 EDI
    X12,
    /// Plain JSON partner API
    Api,
}

/// Everything needed to talk to one external system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationConfig {
    /// Logical name used as the registry key
    pub name: String,
    pub integration_type: IntegrationType,
    /// Base URL of the remote endpoint
    pub endpoint: String,
    /// Per-request timeout
    pub timeout: Duration,
    pub auth: AuthConfig,
    pub retry: RetryPolicy,
    /// Applied to outbound payloads before encoding
    #[serde(default)]
    pub request_mappings: Vec<FieldMapping>,
    /// Applied to decoded responses before returning
    #[serde(default)]
    pub response_mappings: Vec<FieldMapping>,
}

impl IntegrationConfig {
    pub fn new(
        name: impl Into<String>,
        integration_type: IntegrationType,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            integration_type,
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(30),
            auth: AuthConfig::None,
            retry: RetryPolicy::default(),
            request_mappings: Vec::new(),
            response_mappings: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_mappings(mut self, mappings: Vec<FieldMapping>) -> Self {
        self.request_mappings = mappings;
        self
    }

    pub fn with_response_mappings(mut self, mappings: Vec<FieldMapping>) -> Self {
        self.response_mappings = mappings;
        self
    }
}
