//! ANSI X12 005010 EDI exchange
//!
//! Builds 270 eligibility and 278 authorization requests and parses the
//! matching 271/278 responses. X12 is a positional, fixed-delimiter text
//! format - `*` separates elements, `~` terminates segments - so element
//! order is part of the trading-partner contract and is preserved exactly.
//!
//! The transport is EDI-over-HTTPS as clearinghouse gateways accept it:
//! the raw transaction text is POSTed to the configured endpoint and the
//! response body is parsed back out of the same encoding.

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
use crate::mapping::apply_mappings;
use crate::message::{IntegrationMessage, IntegrationResponse, MessageType};
use crate::retry::execute_with_retry;

const ELEMENT_SEPARATOR: char = '*';
const SEGMENT_TERMINATOR: char = '~';

// ============================================================================
// Request/response models
// ============================================================================

/// Inputs for a 270 eligibility inquiry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityInquiry {
    pub payer_id: String,
    #[serde(default)]
    pub payer_name: String,
    pub provider_npi: String,
    #[serde(default)]
    pub provider_name: String,
    pub member_id: String,
    #[serde(default)]
    pub member_first_name: String,
    #[serde(default)]
    pub member_last_name: String,
    /// X12 service type; "30" = health benefit plan coverage
    #[serde(default = "default_service_type")]
    pub service_type_code: String,
    /// Trace number carried on the TRN segment
    #[serde(default)]
    pub trace_number: Option<String>,
}

fn default_service_type() -> String {
    "30".to_string()
}

/// One EB benefit segment from a 271
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenefitInfo {
    /// EB01 - eligibility/benefit info code ("1" = active coverage)
    pub info_code: String,
    /// EB02 - coverage level
    pub coverage_level: Option<String>,
    /// EB03 - service type
    pub service_type_code: Option<String>,
    /// EB05 - plan description
    pub plan_description: Option<String>,
    /// EB07 - monetary amount
    pub amount: Option<f64>,
}

/// Parsed 271 eligibility response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityResult {
    /// No AAA rejection segment present
    pub accepted: bool,
    pub subscriber_id: Option<String>,
    pub benefits: Vec<BenefitInfo>,
    /// AAA03 reject reason codes
    pub rejections: Vec<String>,
}

/// Inputs for a 278 authorization request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationInquiry {
    pub payer_id: String,
    #[serde(default)]
    pub payer_name: String,
    pub provider_npi: String,
    #[serde(default)]
    pub provider_name: String,
    pub member_id: String,
    #[serde(default)]
    pub member_first_name: String,
    #[serde(default)]
    pub member_last_name: String,
    /// UM02 certification type; "I" = initial
    #[serde(default = "default_certification_type")]
    pub certification_type: String,
    /// Requested service type for UM03
    #[serde(default = "default_service_type")]
    pub service_type_code: String,
    /// Primary diagnosis code for the HI segment
    #[serde(default)]
    pub diagnosis_code: Option<String>,
    #[serde(default)]
    pub trace_number: Option<String>,
}

fn default_certification_type() -> String {
    "I".to_string()
}

/// Parsed 278 authorization response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationResult {
    /// HCR01 action code: A1 approved, A3 denied, A4 pended
    pub action_code: Option<String>,
    /// HCR02 certification number
    pub certification_number: Option<String>,
    pub approved: bool,
    pub rejections: Vec<String>,
}

// ============================================================================
// Builders
// ============================================================================

fn segment(elements: &[&str]) -> String {
    let mut s = elements.join(&ELEMENT_SEPARATOR.to_string());
    s.push(SEGMENT_TERMINATOR);
    s
}

fn envelope_open(
    transaction_set: &str,
    implementation_ref: &str,
    functional_code: &str,
    trace: &str,
    purpose_code: &str,
    issued_at: DateTime<Utc>,
) -> Vec<String> {
    let date_short = issued_at.format("%y%m%d").to_string();
    let date_long = issued_at.format("%Y%m%d").to_string();
    let time = issued_at.format("%H%M").to_string();

    vec![
        segment(&[
            "ISA", "00", "          ", "00", "          ", "ZZ", "CAREFLOW       ", "ZZ",
            "PARTNER        ", &date_short, &time, "^", "00501", "000000001", "0", "P", ":",
        ]),
        segment(&[
            "GS",
            functional_code,
            "CAREFLOW",
            "PARTNER",
            &date_long,
            &time,
            "1",
            "X",
            implementation_ref,
        ]),
        segment(&["ST", transaction_set, "0001", implementation_ref]),
        segment(&["BHT", purpose_code, "13", trace, &date_long, &time]),
    ]
}

fn envelope_close(segments: &mut Vec<String>) {
    // SE count covers ST through SE inclusive.
    let st_onward = segments.len() - 2;
    segments.push(segment(&["SE", &(st_onward + 1).to_string(), "0001"]));
    segments.push(segment(&["GE", "1", "1"]));
    segments.push(segment(&["IEA", "1", "000000001"]));
}

/// Builds a 270 eligibility inquiry transaction
///
/// Segment order (ISA GS ST BHT HL NM1 TRN DTP EQ SE GE IEA) is fixed;
/// trading partners reject reordered transactions.
pub fn build_270(inquiry: &EligibilityInquiry, issued_at: DateTime<Utc>) -> String {
    let trace = inquiry
        .trace_number
        .clone()
        .unwrap_or_else(|| issued_at.format("%Y%m%d%H%M%S").to_string());
    let date_long = issued_at.format("%Y%m%d").to_string();

    let mut segments = envelope_open("270", "005010X279A1", "HS", &trace, "0022", issued_at);

    // Information source (payer)
    segments.push(segment(&["HL", "1", "", "20", "1"]));
    segments.push(segment(&[
        "NM1",
        "PR",
        "2",
        &inquiry.payer_name,
        "",
        "",
        "",
        "",
        "PI",
        &inquiry.payer_id,
    ]));

    // Information receiver (provider)
    segments.push(segment(&["HL", "2", "1", "21", "1"]));
    segments.push(segment(&[
        "NM1",
        "1P",
        "2",
        &inquiry.provider_name,
        "",
        "",
        "",
        "",
        "XX",
        &inquiry.provider_npi,
    ]));

    // Subscriber
    segments.push(segment(&["HL", "3", "2", "22", "0"]));
    segments.push(segment(&[
        "NM1",
        "IL",
        "1",
        &inquiry.member_last_name,
        &inquiry.member_first_name,
        "",
        "",
        "",
        "MI",
        &inquiry.member_id,
    ]));
    segments.push(segment(&["TRN", "1", &trace, "9CAREFLOW"]));
    segments.push(segment(&["DTP", "291", "D8", &date_long]));
    segments.push(segment(&["EQ", &inquiry.service_type_code]));

    envelope_close(&mut segments);
    segments.concat()
}

/// Builds a 278 authorization request transaction
pub fn build_278(inquiry: &AuthorizationInquiry, issued_at: DateTime<Utc>) -> String {
    let trace = inquiry
        .trace_number
        .clone()
        .unwrap_or_else(|| issued_at.format("%Y%m%d%H%M%S").to_string());
    let date_long = issued_at.format("%Y%m%d").to_string();

    let mut segments = envelope_open("278", "005010X217", "HI", &trace, "0007", issued_at);

    // Utilization management organization (payer)
    segments.push(segment(&["HL", "1", "", "20", "1"]));
    segments.push(segment(&[
        "NM1",
        "X3",
        "2",
        &inquiry.payer_name,
        "",
        "",
        "",
        "",
        "PI",
        &inquiry.payer_id,
    ]));

    // Requesting provider
    segments.push(segment(&["HL", "2", "1", "21", "1"]));
    segments.push(segment(&[
        "NM1",
        "1P",
        "2",
        &inquiry.provider_name,
        "",
        "",
        "",
        "",
        "XX",
        &inquiry.provider_npi,
    ]));

    // Subscriber
    segments.push(segment(&["HL", "3", "2", "22", "1"]));
    segments.push(segment(&[
        "NM1",
        "IL",
        "1",
        &inquiry.member_last_name,
        &inquiry.member_first_name,
        "",
        "",
        "",
        "MI",
        &inquiry.member_id,
    ]));

    // Patient event
    segments.push(segment(&["HL", "4", "3", "EV", "0"]));
    segments.push(segment(&["TRN", "1", &trace, "9CAREFLOW"]));
    segments.push(segment(&[
        "UM",
        "HS",
        &inquiry.certification_type,
        &inquiry.service_type_code,
    ]));
    segments.push(segment(&["DTP", "435", "D8", &date_long]));
    if let Some(diagnosis) = &inquiry.diagnosis_code {
        segments.push(segment(&["HI", &format!("ABK:{diagnosis}")]));
    }

    envelope_close(&mut segments);
    segments.concat()
}

// ============================================================================
// Parsers
// ============================================================================

fn split_segments(raw: &str) -> Vec<Vec<&str>> {
    raw.split(SEGMENT_TERMINATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.split(ELEMENT_SEPARATOR).collect())
        .collect()
}

fn element<'a>(segment: &[&'a str], index: usize) -> Option<&'a str> {
    segment.get(index).copied().filter(|e| !e.is_empty())
}

/// Parses a 271 eligibility response by scanning segment identifiers
pub fn parse_271(raw: &str) -> EligibilityResult {
    let mut result = EligibilityResult {
        accepted: true,
        subscriber_id: None,
        benefits: Vec::new(),
        rejections: Vec::new(),
    };

    for seg in split_segments(raw) {
        match seg.first().copied() {
            Some("AAA") => {
                result.accepted = false;
                if let Some(code) = element(&seg, 3) {
                    result.rejections.push(code.to_string());
                }
            }
            Some("EB") => {
                result.benefits.push(BenefitInfo {
                    info_code: element(&seg, 1).unwrap_or_default().to_string(),
                    coverage_level: element(&seg, 2).map(str::to_string),
                    service_type_code: element(&seg, 3).map(str::to_string),
                    plan_description: element(&seg, 5).map(str::to_string),
                    amount: element(&seg, 7).and_then(|a| a.parse().ok()),
                });
            }
            Some("NM1") if element(&seg, 1) == Some("IL") => {
                result.subscriber_id = element(&seg, 9).map(str::to_string);
            }
            _ => {}
        }
    }

    result
}

/// Parses a 278 authorization response
pub fn parse_278(raw: &str) -> AuthorizationResult {
    let mut result = AuthorizationResult {
        action_code: None,
        certification_number: None,
        approved: false,
        rejections: Vec::new(),
    };

    for seg in split_segments(raw) {
        match seg.first().copied() {
            Some("HCR") => {
                result.action_code = element(&seg, 1).map(str::to_string);
                result.certification_number = element(&seg, 2).map(str::to_string);
                result.approved = matches!(element(&seg, 1), Some("A1") | Some("A2"));
            }
            Some("AAA") => {
                if let Some(code) = element(&seg, 3) {
                    result.rejections.push(code.to_string());
                }
            }
            _ => {}
        }
    }

    result
}

// ============================================================================
// Adapter
// ============================================================================

/// X12 EDI adapter posting raw transactions to a clearinghouse gateway
pub struct X12Adapter {
    config: IntegrationConfig,
    client: reqwest::Client,
    auth: AuthInjector,
    connected: AtomicBool,
}

impl X12Adapter {
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

    async fn post_transaction(&self, body: String) -> Result<String, PortError> {
        let operation = format!("x12:{}", self.config.name);
        execute_with_retry(&self.config.retry, &operation, || {
            let body = body.clone();
            async move {
                let request = self
                    .client
                    .post(&self.config.endpoint)
                    .header(reqwest::header::CONTENT_TYPE, "application/edi-x12")
                    .body(body);
                let request = self.auth.apply(request).await;
                let response = request
                    .send()
                    .await
                    .map_err(|e| map_transport_error("x12_send", self.config.timeout, e))?;

                let status = response.status();
                let text = response
                    .text()
                    .await
                    .map_err(|e| map_transport_error("x12_read", self.config.timeout, e))?;
                if !status.is_success() {
                    return Err(map_status_error(status, &text));
                }
                Ok(text)
            }
        })
        .await
    }

    /// Maps the outbound payload to the transaction-input field names
    fn outbound_payload(&self, message: &IntegrationMessage) -> serde_json::Value {
        if self.config.request_mappings.is_empty() {
            message.payload.clone()
        } else {
            apply_mappings(&self.config.request_mappings, &message.payload)
        }
    }

    /// Maps the parsed transaction result into the caller's response shape
    fn inbound_data(&self, raw: serde_json::Value) -> serde_json::Value {
        if self.config.response_mappings.is_empty() {
            raw
        } else {
            apply_mappings(&self.config.response_mappings, &raw)
        }
    }

    fn decode_payload<T: serde::de::DeserializeOwned>(
        payload: &serde_json::Value,
    ) -> Result<T, PortError> {
        serde_json::from_value(payload.clone()).map_err(|e| PortError::Transformation {
            message: format!("payload does not match transaction inputs: {e}"),
        })
    }
}

#[async_trait]
impl IntegrationAdapter for X12Adapter {
    fn integration_type(&self) -> IntegrationType {
        IntegrationType::X12
    }

    async fn connect(&self) -> Result<bool, PortError> {
        // The gateway has no handshake; any HTTP answer means reachable.
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
        let issued_at = Utc::now();

        let payload = self.outbound_payload(message);
        let built = match message.message_type {
            MessageType::EligibilityCheck => {
                Self::decode_payload::<EligibilityInquiry>(&payload)
                    .map(|inquiry| (build_270(&inquiry, issued_at), TransactionKind::Eligibility))
            }
            MessageType::AuthorizationRequest | MessageType::AuthorizationStatus => {
                Self::decode_payload::<AuthorizationInquiry>(&payload)
                    .map(|inquiry| (build_278(&inquiry, issued_at), TransactionKind::Authorization))
            }
            other => Err(PortError::validation(format!(
                "X12 adapter does not handle {other:?}"
            ))),
        };

        let (transaction, kind) = match built {
            Ok(pair) => pair,
            Err(e) => {
                return IntegrationResponse::fault(fault_code(&e), e.to_string(), started.elapsed())
            }
        };

        debug!(bytes = transaction.len(), "posting X12 transaction");
        match self.post_transaction(transaction).await {
            Ok(raw) => {
                let data = match kind {
                    TransactionKind::Eligibility => {
                        serde_json::to_value(parse_271(&raw)).unwrap_or_default()
                    }
                    TransactionKind::Authorization => {
                        serde_json::to_value(parse_278(&raw)).unwrap_or_default()
                    }
                };
                IntegrationResponse::ok(self.inbound_data(data), started.elapsed())
                    .with_metadata("correlation_id", message.correlation_id.clone())
            }
            Err(e) => {
                warn!(error = %e, "X12 exchange failed");
                IntegrationResponse::fault(fault_code(&e), e.to_string(), started.elapsed())
            }
        }
    }

    async fn receive_message(&self) -> Result<Vec<IntegrationMessage>, PortError> {
        // Request/response only; the gateway pushes nothing.
        Ok(Vec::new())
    }

    async fn health_check(&self) -> bool {
        self.client.get(&self.config.endpoint).send().await.is_ok()
    }
}

enum TransactionKind {
    Eligibility,
    Authorization,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::mapping::FieldMapping;

    fn inquiry() -> EligibilityInquiry {
        EligibilityInquiry {
            payer_id: "12345".to_string(),
            payer_name: "ACME HEALTH".to_string(),
            provider_npi: "999".to_string(),
            provider_name: "MERCY CLINIC".to_string(),
            member_id: "ABC1".to_string(),
            member_first_name: "JANE".to_string(),
            member_last_name: "ROE".to_string(),
            service_type_code: "30".to_string(),
            trace_number: Some("TRACE01".to_string()),
        }
    }

    fn issued() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 0).unwrap()
    }

    #[test]
    fn test_270_payer_segment_contains_payer_id_exactly_once() {
        let edi = build_270(&inquiry(), issued());

        let payer_segment = edi
            .split('~')
            .find(|s| s.starts_with("NM1*PR*2"))
            .expect("payer NM1 segment present");
        assert!(payer_segment.ends_with("*PI*12345"));
        assert_eq!(edi.matches("12345").count(), 1);
    }

    #[test]
    fn test_270_segment_order_is_fixed() {
        let edi = build_270(&inquiry(), issued());
        let ids: Vec<&str> = edi
            .split('~')
            .filter(|s| !s.is_empty())
            .map(|s| s.split('*').next().unwrap())
            .collect();
        assert_eq!(
            ids,
            vec![
                "ISA", "GS", "ST", "BHT", "HL", "NM1", "HL", "NM1", "HL", "NM1", "TRN", "DTP",
                "EQ", "SE", "GE", "IEA"
            ]
        );
    }

    #[test]
    fn test_270_subscriber_and_service_type() {
        let edi = build_270(&inquiry(), issued());
        assert!(edi.contains("NM1*IL*1*ROE*JANE****MI*ABC1~"));
        assert!(edi.contains("EQ*30~"));
        assert!(edi.contains("TRN*1*TRACE01*9CAREFLOW~"));
        assert!(edi.contains("DTP*291*D8*20240315~"));
    }

    #[test]
    fn test_se_count_covers_st_through_se() {
        let edi = build_270(&inquiry(), issued());
        let se = edi
            .split('~')
            .find(|s| s.starts_with("SE*"))
            .unwrap()
            .split('*')
            .nth(1)
            .unwrap();
        // ST BHT HL NM1 HL NM1 HL NM1 TRN DTP EQ SE
        assert_eq!(se, "12");
    }

    #[test]
    fn test_parse_271_accepted_with_benefits() {
        let raw = "ISA*00~ST*271*0001~NM1*IL*1*ROE*JANE***MI*ABC1~\
                   EB*1*IND*30**GOLD PLAN**250~EB*B*IND*30~SE*5*0001~";
        let result = parse_271(raw);

        assert!(result.accepted);
        assert_eq!(result.subscriber_id.as_deref(), Some("ABC1"));
        assert_eq!(result.benefits.len(), 2);
        assert_eq!(result.benefits[0].info_code, "1");
        assert_eq!(result.benefits[0].plan_description.as_deref(), Some("GOLD PLAN"));
        assert_eq!(result.benefits[0].amount, Some(250.0));
        assert!(result.rejections.is_empty());
    }

    #[test]
    fn test_parse_271_rejection() {
        let raw = "ST*271*0001~AAA*Y**42*N~SE*3*0001~";
        let result = parse_271(raw);
        assert!(!result.accepted);
        assert_eq!(result.rejections, vec!["42"]);
        assert!(result.benefits.is_empty());
    }

    #[test]
    fn test_278_builder_core_segments() {
        let inquiry = AuthorizationInquiry {
            payer_id: "12345".to_string(),
            payer_name: "ACME HEALTH".to_string(),
            provider_npi: "999".to_string(),
            provider_name: "MERCY CLINIC".to_string(),
            member_id: "ABC1".to_string(),
            member_first_name: "JANE".to_string(),
            member_last_name: "ROE".to_string(),
            certification_type: "I".to_string(),
            service_type_code: "2".to_string(),
            diagnosis_code: Some("E11.9".to_string()),
            trace_number: Some("TRACE02".to_string()),
        };
        let edi = build_278(&inquiry, issued());

        assert!(edi.contains("ST*278*0001*005010X217~"));
        assert!(edi.contains("NM1*X3*2*ACME HEALTH*****PI*12345~"));
        assert!(edi.contains("UM*HS*I*2~"));
        assert!(edi.contains("HI*ABK:E11.9~"));
    }

    #[test]
    fn test_parse_278_approved() {
        let raw = "ST*278*0001~HCR*A1*CERT777~SE*3*0001~";
        let result = parse_278(raw);
        assert!(result.approved);
        assert_eq!(result.action_code.as_deref(), Some("A1"));
        assert_eq!(result.certification_number.as_deref(), Some("CERT777"));
    }

    #[test]
    fn test_parse_278_pended_with_rejection() {
        let raw = "ST*278*0001~HCR*A4~AAA*N**79~SE*4*0001~";
        let result = parse_278(raw);
        assert!(!result.approved);
        assert_eq!(result.action_code.as_deref(), Some("A4"));
        assert_eq!(result.rejections, vec!["79"]);
    }

    #[test]
    fn test_request_mappings_shape_partner_payload_into_270_inputs() {
        let config =
            IntegrationConfig::new("clearinghouse", IntegrationType::X12, "http://localhost/x12")
                .with_request_mappings(vec![
                    FieldMapping::new("payer.id", "payer_id"),
                    FieldMapping::new("provider.npi", "provider_npi"),
                    FieldMapping::new("subscriber.id", "member_id"),
                    FieldMapping::new("subscriber.last", "member_last_name"),
                ]);
        let adapter = X12Adapter::new(config);
        let message = IntegrationMessage::new(
            MessageType::EligibilityCheck,
            "careflow",
            "clearinghouse",
            serde_json::json!({
                "payer": { "id": "12345" },
                "provider": { "npi": "999" },
                "subscriber": { "id": "ABC1", "last": "ROE" }
            }),
        );

        let payload = adapter.outbound_payload(&message);
        let decoded: EligibilityInquiry = X12Adapter::decode_payload(&payload).unwrap();
        assert_eq!(decoded.member_id, "ABC1");
        assert_eq!(decoded.member_last_name, "ROE");
        assert_eq!(decoded.payer_id, "12345");
        assert_eq!(decoded.provider_npi, "999");
        assert_eq!(decoded.service_type_code, "30");
    }

    #[test]
    fn test_response_mappings_reshape_transaction_result() {
        let config =
            IntegrationConfig::new("clearinghouse", IntegrationType::X12, "http://localhost/x12")
                .with_response_mappings(vec![
                    FieldMapping::new("accepted", "eligibility.active"),
                    FieldMapping::new("benefits", "eligibility.benefits"),
                ]);
        let adapter = X12Adapter::new(config);

        let data = adapter.inbound_data(serde_json::json!({
            "accepted": true,
            "benefits": [{ "service_type": "30", "coverage_level": "IND" }]
        }));
        assert_eq!(data["eligibility"]["active"], serde_json::json!(true));
        assert_eq!(data["eligibility"]["benefits"][0]["service_type"], "30");
    }
}
