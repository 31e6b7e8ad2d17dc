//! Generic RFC 6749 token-endpoint adapter.
//!
//! Talks to a provider's token endpoint with form-encoded
//! `authorization_code` / `refresh_token` grants and translates the
//! upstream response into a [`ProviderTokenRecord`] or [`ProviderError`].

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ProviderAdapter, ProviderError, ProviderKey, ProviderTokenRecord};
use crate::config::ProviderConfig;
use crate::unix_now;

/// OAuth token response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    scope: Option<String>,
}

/// OAuth error response
#[derive(Debug, Default, Deserialize)]
struct UpstreamError {
    #[serde(default)]
    error: String,
    error_description: Option<String>,
}

/// Adapter for a provider exposing a standard token endpoint
pub struct HttpProviderAdapter {
    key: ProviderKey,
    config: ProviderConfig,
    http_client: Client,
}

impl HttpProviderAdapter {
    /// Create an adapter for `key` using the given configuration.
    #[must_use]
    pub fn new(key: ProviderKey, config: ProviderConfig, http_client: Client) -> Self {
        Self {
            key,
            config,
            http_client,
        }
    }

    /// POST a grant to the token endpoint and classify the outcome.
    async fn token_request(
        &self,
        params: &[(&str, &str)],
    ) -> Result<ProviderTokenRecord, ProviderError> {
        let mut form: Vec<(&str, &str)> = params.to_vec();
        form.push(("client_id", self.config.client_id.as_str()));
        if let Some(secret) = self.config.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        let response = self
            .http_client
            .post(&self.config.token_endpoint)
            .header("accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("token request failed: {e}")))?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            let upstream: UpstreamError = serde_json::from_str(&body).unwrap_or_default();
            let error = if upstream.error.is_empty() {
                format!("http_{}", status.as_u16())
            } else {
                upstream.error
            };
            warn!(
                provider = %self.key,
                status = %status,
                error = %error,
                "Provider rejected token request"
            );
            return Err(ProviderError::Rejected {
                error,
                description: upstream.error_description,
            });
        }
        if !status.is_success() {
            warn!(provider = %self.key, status = %status, "Provider token endpoint failed");
            return Err(ProviderError::Unavailable(format!("HTTP {status}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let expires_in = token
            .expires_in
            .unwrap_or(self.config.default_expires_in.as_secs());

        debug!(provider = %self.key, expires_in, "Provider token response received");

        Ok(ProviderTokenRecord {
            access_token: token.access_token,
            refresh_token: token.refresh_token.filter(|t| !t.is_empty()),
            expires_at: unix_now().saturating_add(expires_in),
            scope: token
                .scope
                .unwrap_or_else(|| self.config.scopes.join(" ")),
        })
    }
}

#[async_trait]
impl ProviderAdapter for HttpProviderAdapter {
    fn key(&self) -> ProviderKey {
        self.key
    }

    fn refresh_token_rotates(&self) -> bool {
        self.config.refresh_token_rotates
    }

    fn supported_scopes(&self) -> &[String] {
        &self.config.scopes
    }

    async fn exchange_code(
        &self,
        code: &str,
        verifier: Option<&str>,
    ) -> Result<ProviderTokenRecord, ProviderError> {
        let mut params = vec![("grant_type", "authorization_code"), ("code", code)];
        if let Some(redirect_uri) = self.config.redirect_uri.as_deref() {
            params.push(("redirect_uri", redirect_uri));
        }
        if let Some(verifier) = verifier {
            params.push(("code_verifier", verifier));
        }
        self.token_request(&params).await
    }

    async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<ProviderTokenRecord, ProviderError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(server: &MockServer, rotates: bool) -> HttpProviderAdapter {
        let config = ProviderConfig {
            enabled: true,
            token_endpoint: format!("{}/oauth/token", server.uri()),
            client_id: "bridge-client".to_string(),
            client_secret: Some("s3cret".to_string()),
            redirect_uri: None,
            scopes: vec!["read".to_string()],
            refresh_token_rotates: rotates,
            default_expires_in: Duration::from_secs(3600),
        };
        HttpProviderAdapter::new(ProviderKey::IssueTracker, config, Client::new())
    }

    #[tokio::test]
    async fn exchange_code_posts_form_and_parses_record() {
        // GIVEN: a token endpoint answering with a full token response
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code_verifier=v123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "up-at",
                "refresh_token": "up-rt",
                "expires_in": 600,
                "scope": "read write"
            })))
            .mount(&server)
            .await;

        // WHEN: exchanging a code with a verifier
        let record = adapter(&server, true)
            .exchange_code("c0de", Some("v123"))
            .await
            .unwrap();

        // THEN: the record carries the upstream values
        assert_eq!(record.access_token, "up-at");
        assert_eq!(record.refresh_token.as_deref(), Some("up-rt"));
        assert_eq!(record.scope, "read write");
        assert!(record.expires_at >= unix_now() + 590);
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_in_response() {
        // GIVEN: a static provider that omits the refresh token and expiry
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh"
            })))
            .mount(&server)
            .await;

        // WHEN: refreshing
        let record = adapter(&server, false)
            .refresh_access_token("old-rt")
            .await
            .unwrap();

        // THEN: no refresh token, configured default lifetime and scopes apply
        assert_eq!(record.refresh_token, None);
        assert_eq!(record.scope, "read");
        assert!(record.expires_at >= unix_now() + 3590);
    }

    #[tokio::test]
    async fn huge_expires_in_saturates_instead_of_overflowing() {
        // GIVEN: a provider reporting an absurd lifetime
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"access_token":"a","expires_in":18446744073709551615}"#,
            ))
            .mount(&server)
            .await;

        // WHEN: refreshing
        let record = adapter(&server, false)
            .refresh_access_token("rt")
            .await
            .unwrap();

        // THEN: the expiry is clamped to the far future
        assert_eq!(record.access_token, "a");
        assert_eq!(record.expires_at, u64::MAX);
    }

    #[tokio::test]
    async fn upstream_4xx_is_non_retryable_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "refresh token expired"
            })))
            .mount(&server)
            .await;

        let err = adapter(&server, true)
            .refresh_access_token("dead")
            .await
            .unwrap_err();

        assert!(!err.is_retryable());
        match err {
            ProviderError::Rejected { error, description } => {
                assert_eq!(error, "invalid_grant");
                assert_eq!(description.as_deref(), Some("refresh token expired"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn upstream_5xx_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = adapter(&server, true)
            .exchange_code("c", None)
            .await
            .unwrap_err();

        assert!(err.is_retryable());
    }
}
