//! Scripted Integration Adapters
//!
//! An in-process stand-in for an external system so integration-manager
//! and workflow-engine tests run without a network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use core_kernel::PortError;
use infra_integration::{
    IntegrationAdapter, IntegrationMessage, IntegrationResponse, IntegrationType,
};
use serde_json::json;

/// A scripted adapter that records traffic and replays queued responses
///
/// Responses queued with [`push_response`](Self::push_response) are consumed
/// in order; once the queue is empty every send returns a generic success.
pub struct MockAdapter {
    integration_type: IntegrationType,
    connectable: AtomicBool,
    healthy: AtomicBool,
    responses: Mutex<VecDeque<IntegrationResponse>>,
    sent: Mutex<Vec<IntegrationMessage>>,
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAdapter {
    /// Creates a healthy, connectable adapter with no scripted responses
    pub fn new() -> Self {
        Self {
            integration_type: IntegrationType::Api,
            connectable: AtomicBool::new(true),
            healthy: AtomicBool::new(true),
            responses: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Sets the protocol the adapter claims to speak
    pub fn with_type(mut self, integration_type: IntegrationType) -> Self {
        self.integration_type = integration_type;
        self
    }

    /// Queues one response to replay on the next send
    pub fn push_response(&self, response: IntegrationResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// Makes subsequent `connect` calls report unreachable
    pub fn refuse_connections(&self) {
        self.connectable.store(false, Ordering::SeqCst);
    }

    /// Flips the health flag
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Messages sent through this adapter, in order
    pub fn sent_messages(&self) -> Vec<IntegrationMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Number of messages sent through this adapter
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl IntegrationAdapter for MockAdapter {
    fn integration_type(&self) -> IntegrationType {
        self.integration_type
    }

    async fn connect(&self) -> Result<bool, PortError> {
        Ok(self.connectable.load(Ordering::SeqCst))
    }

    async fn disconnect(&self) -> Result<(), PortError> {
        Ok(())
    }

    async fn send_message(&self, message: &IntegrationMessage) -> IntegrationResponse {
        self.sent.lock().unwrap().push(message.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                IntegrationResponse::ok(json!({"status": "ok"}), Duration::from_millis(1))
            })
    }

    async fn receive_message(&self) -> Result<Vec<IntegrationMessage>, PortError> {
        Ok(Vec::new())
    }

    async fn health_check(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}
