//! Integration Layer
//!
//! Exchanges data with external clinical and payer systems over
//! heterogeneous wire protocols. Every protocol hides behind one
//! [`IntegrationAdapter`] trait; authentication injection, retry with
//! backoff, and declarative field mapping are standalone utilities the
//! adapters compose rather than inherit.
//!
//! # Adapters
//!
//! - [`FhirAdapter`] - FHIR REST/JSON, capability probe on `/metadata`
//! - [`Hl7Adapter`] - pipe-delimited HL7 v2 segments over HTTP
//! - [`X12Adapter`] - ANSI X12 005010 EDI (270/271 eligibility, 278
//!   authorization)
//! - [`RestAdapter`] - plain JSON request/response for bespoke partner APIs
//!
//! # Manager
//!
//! [`IntegrationManager`] owns the name -> adapter registry, refuses
//! registration when an adapter cannot connect, broadcasts a
//! `message_sent` event per exchange, and answers the workflow engine's
//! dispatch port.

pub mod adapter;
pub mod auth;
pub mod config;
pub mod fhir;
pub mod hl7;
mod http;
pub mod manager;
pub mod mapping;
pub mod message;
pub mod rest;
pub mod retry;
pub mod settings;
pub mod x12;

pub use adapter::IntegrationAdapter;
pub use auth::AuthInjector;
pub use config::{IntegrationConfig, IntegrationType};
pub use fhir::FhirAdapter;
pub use hl7::Hl7Adapter;
pub use manager::{IntegrationEvent, IntegrationManager};
pub use mapping::{apply_mappings, FieldMapping};
pub use message::{IntegrationFault, IntegrationMessage, IntegrationResponse, MessageType};
pub use rest::RestAdapter;
pub use retry::{execute_with_retry, BackoffType, RetryCondition, RetryPolicy};
pub use settings::IntegrationSettings;
pub use x12::X12Adapter;
