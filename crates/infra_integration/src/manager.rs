//! Integration registry and dispatch
//!
//! The manager owns every configured external connection under a logical
//! name. Registration builds the protocol adapter for the config, verifies
//! connectivity, and refuses to keep an entry whose connect failed. Each
//! exchange is broadcast as an observability event; subscribers come and
//! go without affecting delivery.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, instrument, warn};

use core_kernel::{HealthCheckResult, OperationMetadata, PortError};
use domain_workflow::IntegrationDispatch;

use crate::adapter::IntegrationAdapter;
use crate::config::{IntegrationConfig, IntegrationType};
use crate::fhir::FhirAdapter;
use crate::hl7::Hl7Adapter;
use crate::message::{IntegrationMessage, IntegrationResponse, MessageType};
use crate::rest::RestAdapter;
use crate::x12::X12Adapter;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Observability events emitted by the manager
#[derive(Debug, Clone)]
pub enum IntegrationEvent {
    /// One message exchange completed (successfully or not)
    MessageSent {
        integration: String,
        message: IntegrationMessage,
        response: IntegrationResponse,
    },
    /// An integration joined the registry
    Registered { integration: String },
    /// An integration left the registry
    Unregistered { integration: String },
}

struct RegisteredIntegration {
    config: IntegrationConfig,
    adapter: Arc<dyn IntegrationAdapter>,
}

/// Registry of named integrations
pub struct IntegrationManager {
    registry: RwLock<HashMap<String, RegisteredIntegration>>,
    events: broadcast::Sender<IntegrationEvent>,
    /// Source system stamped on dispatched messages
    source_system: String,
}

impl IntegrationManager {
    pub fn new(source_system: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            registry: RwLock::new(HashMap::new()),
            events,
            source_system: source_system.into(),
        }
    }

    /// Subscribes to manager events
    pub fn subscribe(&self) -> broadcast::Receiver<IntegrationEvent> {
        self.events.subscribe()
    }

    fn build_adapter(config: &IntegrationConfig) -> Arc<dyn IntegrationAdapter> {
        match config.integration_type {
            IntegrationType::Fhir => Arc::new(FhirAdapter::new(config.clone())),
            IntegrationType::Hl7 => Arc::new(Hl7Adapter::new(config.clone())),
            IntegrationType::X12 => Arc::new(X12Adapter::new(config.clone())),
            IntegrationType::Api => Arc::new(RestAdapter::new(config.clone())),
        }
    }

    /// Registers an integration, building the adapter for its protocol
    ///
    /// Fails without touching the registry when the adapter cannot connect;
    /// there is never a half-registered entry.
    #[instrument(skip_all, fields(integration = %config.name))]
    pub async fn register(&self, config: IntegrationConfig) -> Result<(), PortError> {
        let adapter = Self::build_adapter(&config);
        self.register_adapter(config, adapter).await
    }

    /// Registers a pre-built adapter under a config
    ///
    /// The seam used by tests and by callers with custom protocols.
    pub async fn register_adapter(
        &self,
        config: IntegrationConfig,
        adapter: Arc<dyn IntegrationAdapter>,
    ) -> Result<(), PortError> {
        let name = config.name.clone();
        {
            let registry = self.registry.read().await;
            if registry.contains_key(&name) {
                return Err(PortError::conflict(format!(
                    "integration '{name}' is already registered"
                )));
            }
        }

        if !adapter.connect().await? {
            return Err(PortError::connection(format!(
                "integration '{name}' failed to connect"
            )));
        }

        // connect ran outside the lock; a rival registration may have landed
        let mut registry = self.registry.write().await;
        if registry.contains_key(&name) {
            drop(registry);
            if let Err(e) = adapter.disconnect().await {
                warn!(integration = %name, error = %e, "disconnect failed after losing registration race");
            }
            return Err(PortError::conflict(format!(
                "integration '{name}' is already registered"
            )));
        }
        registry.insert(name.clone(), RegisteredIntegration { config, adapter });
        drop(registry);
        info!(integration = %name, "integration registered");
        let _ = self.events.send(IntegrationEvent::Registered { integration: name });
        Ok(())
    }

    /// Disconnects and removes an integration
    pub async fn unregister(&self, name: &str) -> Result<(), PortError> {
        let removed = self.registry.write().await.remove(name);
        match removed {
            Some(entry) => {
                if let Err(e) = entry.adapter.disconnect().await {
                    warn!(integration = name, error = %e, "disconnect failed during unregister");
                }
                let _ = self.events.send(IntegrationEvent::Unregistered {
                    integration: name.to_string(),
                });
                Ok(())
            }
            None => Err(PortError::not_found("integration", name)),
        }
    }

    /// Names of all registered integrations
    pub async fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Sends a message through the named integration
    ///
    /// Emits a `MessageSent` event carrying the request/response pair.
    #[instrument(skip_all, fields(integration = name, message_id = %message.id))]
    pub async fn send_message(
        &self,
        name: &str,
        message: IntegrationMessage,
    ) -> Result<IntegrationResponse, PortError> {
        let adapter = {
            let registry = self.registry.read().await;
            registry
                .get(name)
                .map(|entry| Arc::clone(&entry.adapter))
                .ok_or_else(|| PortError::not_found("integration", name))?
        };

        let response = adapter.send_message(&message).await;
        let _ = self.events.send(IntegrationEvent::MessageSent {
            integration: name.to_string(),
            message,
            response: response.clone(),
        });
        Ok(response)
    }

    /// Health-checks every registered integration concurrently
    ///
    /// A failing or erroring check is reported as unhealthy, never raised.
    pub async fn health_check_all(&self) -> Vec<HealthCheckResult> {
        let adapters: Vec<(String, Arc<dyn IntegrationAdapter>)> = {
            let registry = self.registry.read().await;
            registry
                .iter()
                .map(|(name, entry)| (name.clone(), Arc::clone(&entry.adapter)))
                .collect()
        };

        let checks = adapters.into_iter().map(|(name, adapter)| async move {
            let started = std::time::Instant::now();
            if adapter.health_check().await {
                HealthCheckResult::healthy(name, started.elapsed().as_millis() as u64)
            } else {
                HealthCheckResult::unhealthy(name, "health check failed")
            }
        });

        let mut results = join_all(checks).await;
        results.sort_by(|a, b| a.adapter_id.cmp(&b.adapter_id));
        results
    }

    /// Target system name from the registered config
    async fn target_system(&self, name: &str) -> String {
        let registry = self.registry.read().await;
        registry
            .get(name)
            .map(|entry| entry.config.endpoint.clone())
            .unwrap_or_else(|| name.to_string())
    }
}

#[async_trait]
impl IntegrationDispatch for IntegrationManager {
    /// Answers the workflow engine's dispatch port
    ///
    /// The operation string selects the logical message type; the response
    /// payload (or the structured fault, as an error) flows back to the
    /// engine for recording on the workflow.
    async fn dispatch(
        &self,
        integration: &str,
        operation: &str,
        payload: serde_json::Value,
        metadata: &OperationMetadata,
    ) -> Result<serde_json::Value, PortError> {
        let message_type = MessageType::from_operation(operation).ok_or_else(|| {
            PortError::validation(format!("unknown integration operation '{operation}'"))
        })?;

        let message = IntegrationMessage::new(
            message_type,
            self.source_system.clone(),
            self.target_system(integration).await,
            payload,
        )
        .with_correlation_id(metadata.correlation_id.clone());

        let response = self.send_message(integration, message).await?;
        if response.success {
            Ok(response.data.unwrap_or(serde_json::Value::Null))
        } else {
            let fault = response.error.unwrap_or_else(|| crate::message::IntegrationFault {
                code: "UNKNOWN".to_string(),
                message: "integration reported failure without a fault".to_string(),
                details: None,
            });
            Err(PortError::Upstream {
                status: 502,
                message: format!("{}: {}", fault.code, fault.message),
            })
        }
    }
}
