//! Generic JSON adapter for bespoke partner APIs
//!
//! Used for integrations typed `api`: the mapped payload is POSTed as JSON
//! to the configured endpoint and the JSON response is mapped back. No
//! protocol framing beyond HTTP.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{instrument, warn};

use core_kernel::PortError;

use crate::adapter::IntegrationAdapter;
use crate::auth::AuthInjector;
use crate::config::{IntegrationConfig, IntegrationType};
use crate::http::{build_client, fault_code, map_status_error, map_transport_error};
use crate::mapping::apply_mappings;
use crate::message::{IntegrationMessage, IntegrationResponse};
use crate::retry::execute_with_retry;

pub struct RestAdapter {
    config: IntegrationConfig,
    client: reqwest::Client,
    auth: AuthInjector,
    connected: AtomicBool,
}

impl RestAdapter {
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

    async fn post_json(&self, body: serde_json::Value) -> Result<serde_json::Value, PortError> {
        let operation = format!("api:{}", self.config.name);
        execute_with_retry(&self.config.retry, &operation, || {
            let body = body.clone();
            async move {
                let request = self.client.post(&self.config.endpoint).json(&body);
                let request = self.auth.apply(request).await;
                let response = request
                    .send()
                    .await
                    .map_err(|e| map_transport_error("api_send", self.config.timeout, e))?;

                let status = response.status();
                let text = response
                    .text()
                    .await
                    .map_err(|e| map_transport_error("api_read", self.config.timeout, e))?;
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
impl IntegrationAdapter for RestAdapter {
    fn integration_type(&self) -> IntegrationType {
        IntegrationType::Api
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

        let body = if self.config.request_mappings.is_empty() {
            message.payload.clone()
        } else {
            apply_mappings(&self.config.request_mappings, &message.payload)
        };

        match self.post_json(body).await {
            Ok(raw) => {
                let data = if self.config.response_mappings.is_empty() {
                    raw
                } else {
                    apply_mappings(&self.config.response_mappings, &raw)
                };
                IntegrationResponse::ok(data, started.elapsed())
                    .with_metadata("correlation_id", message.correlation_id.clone())
            }
            Err(e) => {
                warn!(error = %e, "API exchange failed");
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
