//! Message envelopes crossing the integration boundary

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::MessageId;

/// Logical message types the integration layer understands
///
/// Each adapter maps a logical type onto its protocol's own vocabulary
/// (FHIR resource, HL7 message code, X12 transaction set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    EligibilityCheck,
    AuthorizationRequest,
    AuthorizationStatus,
    ClaimSubmission,
    ClaimStatusQuery,
    PatientDemographics,
    Referral,
    Notification,
}

impl MessageType {
    /// Parses the operation names used by rule actions and dispatch calls
    pub fn from_operation(operation: &str) -> Option<Self> {
        match operation {
            "eligibility_check" => Some(MessageType::EligibilityCheck),
            "authorization_request" => Some(MessageType::AuthorizationRequest),
            "authorization_status" => Some(MessageType::AuthorizationStatus),
            "claim_submission" => Some(MessageType::ClaimSubmission),
            "claim_status_query" => Some(MessageType::ClaimStatusQuery),
            "patient_demographics" => Some(MessageType::PatientDemographics),
            "referral" => Some(MessageType::Referral),
            "notification" => Some(MessageType::Notification),
            _ => None,
        }
    }
}

/// An outbound request to an external system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationMessage {
    pub id: MessageId,
    pub message_type: MessageType,
    pub source_system: String,
    pub target_system: String,
    pub correlation_id: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl IntegrationMessage {
    pub fn new(
        message_type: MessageType,
        source_system: impl Into<String>,
        target_system: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: MessageId::new_v7(),
            message_type,
            source_system: source_system.into(),
            target_system: target_system.into(),
            correlation_id: uuid_correlation(),
            payload,
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

fn uuid_correlation() -> String {
    MessageId::new().as_uuid().to_string()
}

/// Structured failure carried on a response instead of an error type
///
/// Transport and protocol failures never cross the adapter boundary as
/// raised errors; they land here so callers always get a response object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationFault {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// The outcome of one message exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationResponse {
    pub success: bool,
    pub response_time: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<IntegrationFault>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl IntegrationResponse {
    pub fn ok(data: serde_json::Value, response_time: Duration) -> Self {
        Self {
            success: true,
            response_time,
            data: Some(data),
            error: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn fault(
        code: impl Into<String>,
        message: impl Into<String>,
        response_time: Duration,
    ) -> Self {
        Self {
            success: false,
            response_time,
            data: None,
            error: Some(IntegrationFault {
                code: code.into(),
                message: message.into(),
                details: None,
            }),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
