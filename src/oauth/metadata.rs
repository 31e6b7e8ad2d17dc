//! OAuth metadata documents and dynamic client registration payloads.
//!
//! Implements the server side of RFC 8414 (Authorization Server Metadata),
//! RFC 9728 (Protected Resource Metadata) and RFC 7591 (Dynamic Client
//! Registration).

use serde::{Deserialize, Serialize};
use url::Url;

use super::pkce::S256;
use crate::{Error, Result};

/// Grant types issued to every client
pub const GRANT_TYPES: [&str; 2] = ["authorization_code", "refresh_token"];

/// Path of the token endpoint
pub const TOKEN_PATH: &str = "/access-token";

/// Path of the authorization endpoint
pub const AUTHORIZE_PATH: &str = "/authorize";

/// Path of the registration endpoint
pub const REGISTER_PATH: &str = "/register";

/// OAuth Authorization Server Metadata (RFC 8414)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    /// Issuer identifier
    pub issuer: String,
    /// Authorization endpoint URL
    pub authorization_endpoint: String,
    /// Token endpoint URL
    pub token_endpoint: String,
    /// Dynamic client registration endpoint
    pub registration_endpoint: String,
    /// Supported grant types
    pub grant_types_supported: Vec<String>,
    /// Supported response types
    pub response_types_supported: Vec<String>,
    /// Supported PKCE code challenge methods
    pub code_challenge_methods_supported: Vec<String>,
    /// Supported token endpoint auth methods
    pub token_endpoint_auth_methods_supported: Vec<String>,
    /// Supported scopes
    pub scopes_supported: Vec<String>,
}

impl AuthorizationServerMetadata {
    /// Build the metadata document for `issuer`.
    #[must_use]
    pub fn new(issuer: &str, scopes_supported: Vec<String>) -> Self {
        let base = issuer.trim_end_matches('/');
        Self {
            issuer: base.to_string(),
            authorization_endpoint: format!("{base}{AUTHORIZE_PATH}"),
            token_endpoint: format!("{base}{TOKEN_PATH}"),
            registration_endpoint: format!("{base}{REGISTER_PATH}"),
            grant_types_supported: GRANT_TYPES.iter().map(ToString::to_string).collect(),
            response_types_supported: vec!["code".to_string()],
            code_challenge_methods_supported: vec![S256.to_string()],
            token_endpoint_auth_methods_supported: vec!["none".to_string()],
            scopes_supported,
        }
    }
}

/// OAuth Protected Resource Metadata (RFC 9728)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    /// Protected resource identifier
    pub resource: String,
    /// Authorization servers that can issue tokens for this resource
    pub authorization_servers: Vec<String>,
    /// Supported bearer token methods
    pub bearer_methods_supported: Vec<String>,
    /// Supported scopes
    pub scopes_supported: Vec<String>,
}

impl ProtectedResourceMetadata {
    /// Build the metadata document for `resource`, protected by `issuer`.
    #[must_use]
    pub fn new(resource: &str, issuer: &str, scopes_supported: Vec<String>) -> Self {
        Self {
            resource: resource.to_string(),
            authorization_servers: vec![issuer.trim_end_matches('/').to_string()],
            bearer_methods_supported: vec!["header".to_string()],
            scopes_supported,
        }
    }
}

/// Client registration request (RFC 7591).
///
/// Requested grant types, auth methods and the like are accepted but ignored:
/// every client is registered as a public PKCE client.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientRegistrationRequest {
    /// Redirect URIs (at least one, absolute)
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    /// Human-readable client name
    #[serde(default)]
    pub client_name: Option<String>,
    /// Client home page
    #[serde(default)]
    pub client_uri: Option<String>,
    /// Client logo
    #[serde(default)]
    pub logo_uri: Option<String>,
}

impl ClientRegistrationRequest {
    /// Parse and validate a raw registration body.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let request: Self = serde_json::from_slice(body).map_err(|e| {
            Error::InvalidClientMetadata(format!("Malformed registration body: {e}"))
        })?;
        request.validate()?;
        Ok(request)
    }

    fn validate(&self) -> Result<()> {
        if self.redirect_uris.is_empty() {
            return Err(Error::InvalidClientMetadata(
                "redirect_uris must contain at least one URI".to_string(),
            ));
        }
        for uri in &self.redirect_uris {
            let parsed = Url::parse(uri).map_err(|e| {
                Error::InvalidClientMetadata(format!("Invalid redirect URI {uri:?}: {e}"))
            })?;
            if parsed.fragment().is_some() {
                return Err(Error::InvalidClientMetadata(format!(
                    "Redirect URI {uri:?} must not contain a fragment"
                )));
            }
        }
        for (field, value) in [("client_uri", &self.client_uri), ("logo_uri", &self.logo_uri)] {
            if let Some(v) = value {
                Url::parse(v).map_err(|e| {
                    Error::InvalidClientMetadata(format!("Invalid {field}: {e}"))
                })?;
            }
        }
        Ok(())
    }
}

/// Client registration response (RFC 7591)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRegistrationResponse {
    /// Issued client identifier
    pub client_id: String,
    /// Issue time (Unix seconds)
    pub client_id_issued_at: u64,
    /// Registered redirect URIs
    pub redirect_uris: Vec<String>,
    /// Always `authorization_code` + `refresh_token`
    pub grant_types: Vec<String>,
    /// Always `code`
    pub response_types: Vec<String>,
    /// Always `none` (public client)
    pub token_endpoint_auth_method: String,
    /// Space-separated scopes the client may request
    pub scope: String,
    /// Echoed client name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    /// Echoed client URI
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_uri: Option<String>,
    /// Echoed logo URI
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,
}

impl ClientRegistrationResponse {
    /// Issue a public client for a validated request.
    #[must_use]
    pub fn issue(request: ClientRegistrationRequest, scope: String, issued_at: u64) -> Self {
        Self {
            client_id: uuid::Uuid::new_v4().to_string(),
            client_id_issued_at: issued_at,
            redirect_uris: request.redirect_uris,
            grant_types: GRANT_TYPES.iter().map(ToString::to_string).collect(),
            response_types: vec!["code".to_string()],
            token_endpoint_auth_method: "none".to_string(),
            scope,
            client_name: request.client_name,
            client_uri: request.client_uri,
            logo_uri: request.logo_uri,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_endpoints_derive_from_issuer() {
        // GIVEN: an issuer with a trailing slash
        let meta = AuthorizationServerMetadata::new("https://bridge.example/", vec![]);

        // THEN: endpoints are joined without a double slash
        assert_eq!(meta.issuer, "https://bridge.example");
        assert_eq!(meta.token_endpoint, "https://bridge.example/access-token");
        assert_eq!(meta.authorization_endpoint, "https://bridge.example/authorize");
        assert_eq!(meta.registration_endpoint, "https://bridge.example/register");
        assert_eq!(meta.code_challenge_methods_supported, vec!["S256"]);
        assert_eq!(
            meta.grant_types_supported,
            vec!["authorization_code", "refresh_token"]
        );
    }

    #[test]
    fn protected_resource_points_at_issuer() {
        let meta = ProtectedResourceMetadata::new(
            "https://bridge.example/mcp",
            "https://bridge.example/",
            vec!["read".to_string()],
        );
        assert_eq!(meta.authorization_servers, vec!["https://bridge.example"]);
        assert_eq!(meta.bearer_methods_supported, vec!["header"]);
    }

    #[test]
    fn registration_requires_redirect_uris() {
        let err = ClientRegistrationRequest::parse(br#"{"client_name":"x"}"#).unwrap_err();
        assert_eq!(err.oauth_code(), "invalid_client_metadata");
    }

    #[test]
    fn registration_rejects_relative_redirect_uri() {
        let err = ClientRegistrationRequest::parse(br#"{"redirect_uris":["/cb"]}"#).unwrap_err();
        assert_eq!(err.oauth_code(), "invalid_client_metadata");
    }

    #[test]
    fn registration_rejects_malformed_json() {
        let err = ClientRegistrationRequest::parse(b"{not json").unwrap_err();
        assert_eq!(err.oauth_code(), "invalid_client_metadata");
    }

    #[test]
    fn registration_always_issues_public_pkce_client() {
        // GIVEN: a request asking for extra capabilities
        let request = ClientRegistrationRequest::parse(
            br#"{"redirect_uris":["https://client.example/cb"],
                "grant_types":["client_credentials"],
                "token_endpoint_auth_method":"client_secret_basic",
                "client_name":"Example"}"#,
        )
        .unwrap();

        // WHEN: issuing
        let response =
            ClientRegistrationResponse::issue(request, "read".to_string(), 1_700_000_000);

        // THEN: capabilities are fixed regardless of the request
        assert!(!response.client_id.is_empty());
        assert_eq!(response.grant_types, vec!["authorization_code", "refresh_token"]);
        assert_eq!(response.token_endpoint_auth_method, "none");
        assert_eq!(response.client_name.as_deref(), Some("Example"));
    }
}
