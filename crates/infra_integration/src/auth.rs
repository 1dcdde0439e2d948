//! Per-request authentication injection
//!
//! Adapters hand every outbound request through an [`AuthInjector`] built
//! from the integration's [`AuthConfig`]. OAuth2 tokens are fetched lazily
//! on first use and cached until shortly before expiry.
//!
//! A failed OAuth2 token fetch currently lets the request proceed without
//! an `Authorization` header instead of failing fast; the upstream then
//! rejects it with its own 401. See DESIGN.md before changing this.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use core_kernel::AuthConfig;

/// Renew tokens this long before their reported expiry
const TOKEN_EXPIRY_LEEWAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

/// Applies an authentication strategy to outbound requests
pub struct AuthInjector {
    auth: AuthConfig,
    client: reqwest::Client,
    token_cache: RwLock<Option<CachedToken>>,
}

impl AuthInjector {
    pub fn new(auth: AuthConfig, client: reqwest::Client) -> Self {
        Self {
            auth,
            client,
            token_cache: RwLock::new(None),
        }
    }

    /// Attaches credentials to a request per the configured strategy
    pub async fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            AuthConfig::None => request,
            AuthConfig::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
            AuthConfig::BearerToken { token } => request.bearer_auth(token),
            AuthConfig::ApiKey { header_name, key } => request.header(header_name, key),
            AuthConfig::OAuth2ClientCredentials { .. } => match self.client_credentials_token().await {
                Some(token) => request.bearer_auth(token),
                // Proceed unauthenticated; the upstream will answer 401.
                None => request,
            },
        }
    }

    /// Returns a cached client-credentials token, fetching when stale
    async fn client_credentials_token(&self) -> Option<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.expires_at > Instant::now() {
                    return Some(cached.access_token.clone());
                }
            }
        }

        let AuthConfig::OAuth2ClientCredentials {
            token_url,
            client_id,
            client_secret,
            scope,
        } = &self.auth
        else {
            return None;
        };

        let mut form = vec![
            ("grant_type", "client_credentials".to_string()),
            ("client_id", client_id.clone()),
            ("client_secret", client_secret.clone()),
        ];
        if let Some(scope) = scope {
            form.push(("scope", scope.clone()));
        }

        let response = self.client.post(token_url).form(&form).send().await;
        let token = match response {
            Ok(response) if response.status().is_success() => {
                match response.json::<TokenEndpointResponse>().await {
                    Ok(body) => body,
                    Err(e) => {
                        warn!(token_url = %token_url, error = %e, "token response unparsable");
                        return None;
                    }
                }
            }
            Ok(response) => {
                warn!(
                    token_url = %token_url,
                    status = response.status().as_u16(),
                    "token endpoint rejected client credentials"
                );
                return None;
            }
            Err(e) => {
                warn!(token_url = %token_url, error = %e, "token endpoint unreachable");
                return None;
            }
        };

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_LEEWAY);
        debug!(token_url = %token_url, expires_in = token.expires_in, "access token refreshed");

        let mut cache = self.token_cache.write().await;
        *cache = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Some(token.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Strategies other than OAuth2 are pure header manipulation; assert on
    // the built request rather than the network.

    fn build(injector: &AuthInjector) -> reqwest::Request {
        let client = reqwest::Client::new();
        let request = client.get("http://example.invalid/resource");
        futures::executor::block_on(injector.apply(request))
            .build()
            .unwrap()
    }

    #[test]
    fn test_api_key_header_injected() {
        let injector = AuthInjector::new(
            AuthConfig::ApiKey {
                header_name: "X-Api-Key".to_string(),
                key: "secret-123".to_string(),
            },
            reqwest::Client::new(),
        );
        let request = build(&injector);
        assert_eq!(
            request.headers().get("X-Api-Key").unwrap().to_str().unwrap(),
            "secret-123"
        );
    }

    #[test]
    fn test_bearer_token_injected() {
        let injector = AuthInjector::new(
            AuthConfig::BearerToken {
                token: "tok".to_string(),
            },
            reqwest::Client::new(),
        );
        let request = build(&injector);
        assert_eq!(
            request
                .headers()
                .get(reqwest::header::AUTHORIZATION)
                .unwrap()
                .to_str()
                .unwrap(),
            "Bearer tok"
        );
    }

    #[test]
    fn test_basic_auth_injected() {
        let injector = AuthInjector::new(
            AuthConfig::Basic {
                username: "u".to_string(),
                password: "p".to_string(),
            },
            reqwest::Client::new(),
        );
        let request = build(&injector);
        let header = request
            .headers()
            .get(reqwest::header::AUTHORIZATION)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(header.starts_with("Basic "));
    }

    #[test]
    fn test_no_auth_leaves_request_untouched() {
        let injector = AuthInjector::new(AuthConfig::None, reqwest::Client::new());
        let request = build(&injector);
        assert!(request.headers().get(reqwest::header::AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn test_unreachable_token_endpoint_proceeds_unauthenticated() {
        let injector = AuthInjector::new(
            AuthConfig::OAuth2ClientCredentials {
                token_url: "http://127.0.0.1:1/token".to_string(),
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
                scope: None,
            },
            reqwest::Client::new(),
        );
        let client = reqwest::Client::new();
        let request = injector
            .apply(client.get("http://example.invalid/resource"))
            .await
            .build()
            .unwrap();
        assert!(request.headers().get(reqwest::header::AUTHORIZATION).is_none());
    }
}
