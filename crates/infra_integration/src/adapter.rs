//! The common adapter contract

use async_trait::async_trait;

use core_kernel::PortError;

use crate::config::IntegrationType;
use crate::message::{IntegrationMessage, IntegrationResponse};

/// One external system connection
///
/// Implementations compose the shared auth, retry, and mapping utilities;
/// there is no base-adapter state to inherit. `send_message` never raises
/// past the adapter boundary - transport failures come back as a response
/// with `success = false` and a structured fault.
#[async_trait]
pub trait IntegrationAdapter: Send + Sync {
    /// Protocol this adapter speaks
    fn integration_type(&self) -> IntegrationType;

    /// Establishes or verifies connectivity; `false` means unreachable
    async fn connect(&self) -> Result<bool, PortError>;

    /// Releases any held connection state
    async fn disconnect(&self) -> Result<(), PortError>;

    /// Sends one message and returns the structured outcome
    async fn send_message(&self, message: &IntegrationMessage) -> IntegrationResponse;

    /// Pulls inbound messages; empty for request/response-only protocols
    async fn receive_message(&self) -> Result<Vec<IntegrationMessage>, PortError>;

    /// Whether the remote system currently answers
    async fn health_check(&self) -> bool;
}
