//! Environment-driven integration settings
//!
//! Flat settings deserialized from `CAREFLOW_INTEGRATION_*` environment
//! variables (one integration per process-level prefix is the deployment
//! convention), expanded into a full [`IntegrationConfig`].

use std::time::Duration;

use serde::Deserialize;

use core_kernel::AuthConfig;

use crate::config::{IntegrationConfig, IntegrationType};
use crate::retry::RetryPolicy;

/// Flat environment representation of one integration
#[derive(Debug, Clone, Deserialize)]
pub struct IntegrationSettings {
    /// Registry name
    pub name: String,
    /// One of `fhir`, `hl7`, `x12`, `api`
    pub integration_type: String,
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// One of `none`, `api_key`, `bearer`, `basic`, `oauth2`
    #[serde(default = "default_auth_type")]
    pub auth_type: String,
    #[serde(default)]
    pub api_key_header: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub bearer_token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub oauth_token_url: Option<String>,
    #[serde(default)]
    pub oauth_client_id: Option<String>,
    #[serde(default)]
    pub oauth_client_secret: Option<String>,
    #[serde(default)]
    pub oauth_scope: Option<String>,
    #[serde(default = "default_max_attempts")]
    pub retry_max_attempts: u32,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_auth_type() -> String {
    "none".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

impl IntegrationSettings {
    /// Loads settings from the environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix("CAREFLOW_INTEGRATION").try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    fn auth(&self) -> Result<AuthConfig, config::ConfigError> {
        let missing = |field: &str| {
            config::ConfigError::Message(format!(
                "auth_type '{}' requires {field}",
                self.auth_type
            ))
        };

        match self.auth_type.as_str() {
            "none" => Ok(AuthConfig::None),
            "api_key" => Ok(AuthConfig::ApiKey {
                header_name: self
                    .api_key_header
                    .clone()
                    .unwrap_or_else(|| "X-Api-Key".to_string()),
                key: self.api_key.clone().ok_or_else(|| missing("api_key"))?,
            }),
            "bearer" => Ok(AuthConfig::BearerToken {
                token: self
                    .bearer_token
                    .clone()
                    .ok_or_else(|| missing("bearer_token"))?,
            }),
            "basic" => Ok(AuthConfig::Basic {
                username: self.username.clone().ok_or_else(|| missing("username"))?,
                password: self.password.clone().ok_or_else(|| missing("password"))?,
            }),
            "oauth2" => Ok(AuthConfig::OAuth2ClientCredentials {
                token_url: self
                    .oauth_token_url
                    .clone()
                    .ok_or_else(|| missing("oauth_token_url"))?,
                client_id: self
                    .oauth_client_id
                    .clone()
                    .ok_or_else(|| missing("oauth_client_id"))?,
                client_secret: self
                    .oauth_client_secret
                    .clone()
                    .ok_or_else(|| missing("oauth_client_secret"))?,
                scope: self.oauth_scope.clone(),
            }),
            other => Err(config::ConfigError::Message(format!(
                "unknown auth_type '{other}'"
            ))),
        }
    }

    /// Expands the flat settings into an [`IntegrationConfig`]
    pub fn into_config(self) -> Result<IntegrationConfig, config::ConfigError> {
        let integration_type = match self.integration_type.as_str() {
            "fhir" => IntegrationType::Fhir,
            "hl7" => IntegrationType::Hl7,
            "x12" => IntegrationType::X12,
            "api" => IntegrationType::Api,
            other => {
                return Err(config::ConfigError::Message(format!(
                    "unknown integration_type '{other}'"
                )))
            }
        };

        let auth = self.auth()?;
        let retry = RetryPolicy {
            max_attempts: self.retry_max_attempts,
            ..RetryPolicy::default()
        };

        Ok(IntegrationConfig::new(self.name, integration_type, self.endpoint)
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_auth(auth)
            .with_retry(retry))
    }
}
