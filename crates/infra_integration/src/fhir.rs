//! FHIR REST/JSON adapter
//!
//! Talks to a FHIR R4 server under a base URL. Connectivity and health use
//! the server's capability statement at `{base}/metadata`; messages POST a
//! resource appropriate to the logical message type.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use core_kernel::PortError;

use crate::adapter::IntegrationAdapter;
use crate::auth::AuthInjector;
use crate::config::{IntegrationConfig, IntegrationType};
use crate::http::{build_client, fault_code, map_status_error, map_transport_error};
use crate::mapping::apply_mappings;
use crate::message::{IntegrationMessage, IntegrationResponse, MessageType};
use crate::retry::execute_with_retry;

/// FHIR resource type handling each logical message
///
/// The FHIR surface is the broadest of the adapters; every message type
/// has a resource.
fn resource_for(message_type: MessageType) -> &'static str {
    match message_type {
        MessageType::EligibilityCheck => "CoverageEligibilityRequest",
        MessageType::AuthorizationRequest | MessageType::AuthorizationStatus => "Claim",
        MessageType::ClaimSubmission => "Claim",
        MessageType::ClaimStatusQuery => "ClaimResponse",
        MessageType::PatientDemographics => "Patient",
        MessageType::Referral => "ServiceRequest",
        MessageType::Notification => "Communication",
    }
}

pub struct FhirAdapter {
    config: IntegrationConfig,
    client: reqwest::Client,
    auth: AuthInjector,
    connected: AtomicBool,
}

impl FhirAdapter {
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

    /// Probes the capability statement
    async fn probe_metadata(&self) -> Result<(), PortError> {
        let url = format!("{}/metadata", self.config.endpoint.trim_end_matches('/'));
        let request = self.auth.apply(self.client.get(&url)).await;
        let response = request
            .send()
            .await
            .map_err(|e| map_transport_error("fhir_metadata", self.config.timeout, e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, &body));
        }
        Ok(())
    }

    async fn post_resource(
        &self,
        resource: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, PortError> {
        let url = format!("{}/{resource}", self.config.endpoint.trim_end_matches('/'));
        let operation = format!("fhir:{}:{resource}", self.config.name);

        execute_with_retry(&self.config.retry, &operation, || {
            let url = url.clone();
            let body = body.clone();
            async move {
                let request = self
                    .client
                    .post(&url)
                    .header(reqwest::header::CONTENT_TYPE, "application/fhir+json")
                    .json(&body);
                let request = self.auth.apply(request).await;
                let response = request
                    .send()
                    .await
                    .map_err(|e| map_transport_error("fhir_send", self.config.timeout, e))?;

                let status = response.status();
                let text = response
                    .text()
                    .await
                    .map_err(|e| map_transport_error("fhir_read", self.config.timeout, e))?;
                if !status.is_success() {
                    return Err(map_status_error(status, &text));
                }
                serde_json::from_str(&text).map_err(|e| PortError::Transformation {
                    message: format!("response is not valid JSON: {e}"),
                })
            }
        })
        .await
    }
}

#[async_trait]
impl IntegrationAdapter for FhirAdapter {
    fn integration_type(&self) -> IntegrationType {
        IntegrationType::Fhir
    }

    async fn connect(&self) -> Result<bool, PortError> {
        match self.probe_metadata().await {
            Ok(()) => {
                self.connected.store(true, Ordering::Relaxed);
                Ok(true)
            }
            Err(e) => {
                warn!(integration = %self.config.name, error = %e, "capability probe failed");
                Ok(false)
            }
        }
    }

    async fn disconnect(&self) -> Result<(), PortError> {
        self.connected.store(false, Ordering::Relaxed);
        Ok(())
    }

    #[instrument(skip_all, fields(integration = %self.config.name, message_id = %message.id))]
    async fn send_message(&self, message: &IntegrationMessage) -> IntegrationResponse {
        let started = std::time::Instant::now();

        let resource = resource_for(message.message_type);

        let body = if self.config.request_mappings.is_empty() {
            message.payload.clone()
        } else {
            apply_mappings(&self.config.request_mappings, &message.payload)
        };

        debug!(resource, "posting FHIR resource");
        match self.post_resource(resource, body).await {
            Ok(raw) => {
                let data = if self.config.response_mappings.is_empty() {
                    raw
                } else {
                    apply_mappings(&self.config.response_mappings, &raw)
                };
                IntegrationResponse::ok(data, started.elapsed())
                    .with_metadata("correlation_id", message.correlation_id.clone())
                    .with_metadata("resource", resource)
            }
            Err(e) => {
                warn!(error = %e, "FHIR exchange failed");
                IntegrationResponse::fault(fault_code(&e), e.to_string(), started.elapsed())
            }
        }
    }

    async fn receive_message(&self) -> Result<Vec<IntegrationMessage>, PortError> {
        Ok(Vec::new())
    }

    async fn health_check(&self) -> bool {
        self.probe_metadata().await.is_ok()
    }
}
