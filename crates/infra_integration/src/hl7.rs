//! HL7 v2 adapter
//!
//! Builds pipe-delimited segment messages keyed by a message-type mapping
//! table and exchanges them over HL7-over-HTTP. Responses are expected to
//! be HL7 acknowledgements; the MSA segment decides success.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use core_kernel::PortError;

use crate::adapter::IntegrationAdapter;
use crate::auth::AuthInjector;
use crate::config::{IntegrationConfig, IntegrationType};
use crate::http::{build_client, fault_code, map_status_error, map_transport_error};
use crate::mapping::{apply_mappings, get_path};
use crate::message::{IntegrationMessage, IntegrationResponse, MessageType};
use crate::retry::execute_with_retry;

const FIELD_SEPARATOR: char = '|';
const SEGMENT_SEPARATOR: char = '\r';
const ENCODING_CHARACTERS: &str = "^~\\&";
const VERSION: &str = "2.5.1";

/// Logical message type -> HL7 message code and trigger event
///
/// This table is the protocol contract; receivers route on `MSH-9`.
pub fn message_code(message_type: MessageType) -> (&'static str, &'static str) {
    match message_type {
        MessageType::EligibilityCheck => ("RQI", "I01"),
        MessageType::AuthorizationRequest => ("RQA", "I08"),
        MessageType::AuthorizationStatus => ("RQA", "I08"),
        MessageType::ClaimSubmission => ("DFT", "P03"),
        MessageType::ClaimStatusQuery => ("QRY", "T12"),
        MessageType::PatientDemographics => ("QBP", "Q22"),
        MessageType::Referral => ("REF", "I12"),
        MessageType::Notification => ("ADT", "A08"),
    }
}

fn payload_str(payload: &serde_json::Value, path: &str) -> String {
    match get_path(payload, path) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Builds an HL7 message for a logical type from a JSON payload
///
/// Recognized payload paths: `member_id`, `member_last_name`,
/// `member_first_name`, `birth_date`, `payer_id`, `payer_name`,
/// `diagnosis_code`.
pub fn build_message(
    message_type: MessageType,
    sending_application: &str,
    receiving_application: &str,
    control_id: &str,
    issued_at: DateTime<Utc>,
    payload: &serde_json::Value,
) -> String {
    let (code, trigger) = message_code(message_type);
    let timestamp = issued_at.format("%Y%m%d%H%M%S").to_string();

    let mut segments = vec![format!(
        "MSH{sep}{enc}{sep}{sending}{sep}{sep}{receiving}{sep}{sep}{ts}{sep}{sep}{code}^{trigger}{sep}{control}{sep}P{sep}{version}",
        sep = FIELD_SEPARATOR,
        enc = ENCODING_CHARACTERS,
        sending = sending_application,
        receiving = receiving_application,
        ts = timestamp,
        code = code,
        trigger = trigger,
        control = control_id,
        version = VERSION,
    )];

    let member_id = payload_str(payload, "member_id");
    if !member_id.is_empty() {
        segments.push(format!(
            "PID|1||{member_id}||{last}^{first}||{dob}",
            last = payload_str(payload, "member_last_name"),
            first = payload_str(payload, "member_first_name"),
            dob = payload_str(payload, "birth_date"),
        ));
    }

    let payer_id = payload_str(payload, "payer_id");
    if !payer_id.is_empty() {
        segments.push(format!(
            "IN1|1||{payer_id}|{payer_name}",
            payer_name = payload_str(payload, "payer_name"),
        ));
    }

    if matches!(
        message_type,
        MessageType::AuthorizationRequest | MessageType::AuthorizationStatus
    ) {
        let diagnosis = payload_str(payload, "diagnosis_code");
        segments.push(format!("DG1|1||{diagnosis}"));
    }

    let mut message = segments.join(&SEGMENT_SEPARATOR.to_string());
    message.push(SEGMENT_SEPARATOR);
    message
}

/// Parsed HL7 acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Acknowledgement {
    /// MSA-1: AA/CA accept, AE error, AR reject
    pub ack_code: String,
    /// MSA-2: control id of the message being acknowledged
    pub control_id: Option<String>,
    /// MSA-3: free text
    pub text: Option<String>,
}

impl Acknowledgement {
    pub fn accepted(&self) -> bool {
        matches!(self.ack_code.as_str(), "AA" | "CA")
    }
}

/// Extracts the MSA acknowledgement from a response message
pub fn parse_acknowledgement(raw: &str) -> Option<Acknowledgement> {
    raw.split(['\r', '\n'])
        .map(str::trim)
        .find(|s| s.starts_with("MSA"))
        .map(|msa| {
            let fields: Vec<&str> = msa.split(FIELD_SEPARATOR).collect();
            Acknowledgement {
                ack_code: fields.get(1).copied().unwrap_or_default().to_string(),
                control_id: fields.get(2).map(|s| s.to_string()).filter(|s| !s.is_empty()),
                text: fields.get(3).map(|s| s.to_string()).filter(|s| !s.is_empty()),
            }
        })
}

pub struct Hl7Adapter {
    config: IntegrationConfig,
    client: reqwest::Client,
    auth: AuthInjector,
    connected: AtomicBool,
}

impl Hl7Adapter {
    pub fn new(config: IntegrationConfig) -> Self {
        let client = build_client(config.timeout);
        let auth = AuthInjector::new(config.auth.clone(), client.clone());
        Self {
            config,
            client,
            auth,
            connected: AtomicBool::new(false),
        }
    }

    /// Maps the outbound payload to the segment-builder field names
    fn outbound_payload(&self, message: &IntegrationMessage) -> serde_json::Value {
        if self.config.request_mappings.is_empty() {
            message.payload.clone()
        } else {
            apply_mappings(&self.config.request_mappings, &message.payload)
        }
    }

    /// Maps the parsed acknowledgement into the caller's response shape
    fn inbound_data(&self, raw: serde_json::Value) -> serde_json::Value {
        if self.config.response_mappings.is_empty() {
            raw
        } else {
            apply_mappings(&self.config.response_mappings, &raw)
        }
    }

    async fn post_hl7(&self, body: String) -> Result<String, PortError> {
        let operation = format!("hl7:{}", self.config.name);
        execute_with_retry(&self.config.retry, &operation, || {
            let body = body.clone();
            async move {
                let request = self
                    .client
                    .post(&self.config.endpoint)
                    .header(reqwest::header::CONTENT_TYPE, "x-application/hl7-v2+er7")
                    .body(body);
                let request = self.auth.apply(request).await;
                let response = request
                    .send()
                    .await
                    .map_err(|e| map_transport_error("hl7_send", self.config.timeout, e))?;

                let status = response.status();
                let text = response
                    .text()
                    .await
                    .map_err(|e| map_transport_error("hl7_read", self.config.timeout, e))?;
                if !status.is_success() {
                    return Err(map_status_error(status, &text));
                }
                Ok(text)
            }
        })
        .await
    }
}

#[async_trait]
impl IntegrationAdapter for Hl7Adapter {
    fn integration_type(&self) -> IntegrationType {
        IntegrationType::Hl7
    }

    async fn connect(&self) -> Result<bool, PortError> {
        let reachable = self.client.get(&self.config.endpoint).send().await.is_ok();
        self.connected.store(reachable, Ordering::Relaxed);
        Ok(reachable)
    }

    async fn disconnect(&self) -> Result<(), PortError> {
        self.connected.store(false, Ordering::Relaxed);
        Ok(())
    }

    #[instrument(skip_all, fields(integration = %self.config.name, message_id = %message.id))]
    async fn send_message(&self, message: &IntegrationMessage) -> IntegrationResponse {
        let started = std::time::Instant::now();

        let payload = self.outbound_payload(message);
        let hl7 = build_message(
            message.message_type,
            &message.source_system,
            &message.target_system,
            &message.id.to_string(),
            Utc::now(),
            &payload,
        );

        debug!(bytes = hl7.len(), "posting HL7 message");
        match self.post_hl7(hl7).await {
            Ok(raw) => match parse_acknowledgement(&raw) {
                Some(ack) if ack.accepted() => {
                    let data = self.inbound_data(serde_json::to_value(&ack).unwrap_or_default());
                    IntegrationResponse::ok(data, started.elapsed())
                        .with_metadata("correlation_id", message.correlation_id.clone())
                }
                Some(ack) => IntegrationResponse::fault(
                    "HL7_NAK",
                    ack.text
                        .clone()
                        .unwrap_or_else(|| format!("acknowledgement code {}", ack.ack_code)),
                    started.elapsed(),
                ),
                None => IntegrationResponse::fault(
                    "HL7_NO_ACK",
                    "response carried no MSA segment",
                    started.elapsed(),
                ),
            },
            Err(e) => {
                warn!(error = %e, "HL7 exchange failed");
                IntegrationResponse::fault(fault_code(&e), e.to_string(), started.elapsed())
            }
        }
    }

    async fn receive_message(&self) -> Result<Vec<IntegrationMessage>, PortError> {
        Ok(Vec::new())
    }

    async fn health_check(&self) -> bool {
        self.client.get(&self.config.endpoint).send().await.is_ok()
    }
}
