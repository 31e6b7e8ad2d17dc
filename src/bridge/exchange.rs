//! Token endpoint: grant dispatch and the `authorization_code` grant.
//!
//! Redeeming a code never calls upstream. The tokens were minted when the
//! session completed; all that is left is proving the redeemer is the
//! client the code was issued to.

use serde::Deserialize;
use tracing::debug;

use super::BridgeCore;
use super::audit::{self, AuditEvent};
use crate::oauth::pkce::verify_s256;
use crate::token::TokenPair;
use crate::{Error, Result, unix_now};

/// Token endpoint request (form or JSON).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    /// `authorization_code` or `refresh_token`
    pub grant_type: Option<String>,
    /// Relay code
    pub code: Option<String>,
    /// Client id
    pub client_id: Option<String>,
    /// PKCE verifier
    pub code_verifier: Option<String>,
    /// Redirect URI used at `/authorize`
    pub redirect_uri: Option<String>,
    /// RFC 8707 resource indicator
    pub resource: Option<String>,
    /// Bridge refresh token
    pub refresh_token: Option<String>,
    /// Requested (narrowed) scope
    pub scope: Option<String>,
}

pub(crate) fn param<'a>(value: Option<&'a String>, name: &str) -> Result<&'a str> {
    value
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::invalid_request(format!("{name} is required")))
}

fn deny(client_id: Option<&str>, reason: &str) -> Error {
    audit::emit(&AuditEvent::denied(client_id, reason));
    Error::invalid_grant(reason)
}

impl BridgeCore {
    /// Handle a token endpoint request.
    pub async fn token(&self, request: &TokenRequest) -> Result<TokenPair> {
        match request.grant_type.as_deref() {
            Some("authorization_code") => self.exchange_code(request),
            Some("refresh_token") => self.refresh(request).await,
            Some(other) => Err(Error::UnsupportedGrantType(format!(
                "grant_type {other:?} is not supported"
            ))),
            None => Err(Error::invalid_request("grant_type is required")),
        }
    }

    /// `authorization_code` grant.
    pub fn exchange_code(&self, request: &TokenRequest) -> Result<TokenPair> {
        let code = param(request.code.as_ref(), "code")?;
        let client_id = param(request.client_id.as_ref(), "client_id")?;

        let entry = self
            .relay
            .consume(code)
            .ok_or_else(|| {
                deny(
                    Some(client_id),
                    "Authorization code is invalid, expired or already used",
                )
            })?;

        // The code stays consumed whatever fails below
        if entry.client_id != client_id {
            return Err(deny(Some(client_id), "Code was issued to another client"));
        }
        if let Some(redirect_uri) = request.redirect_uri.as_deref()
            && redirect_uri != entry.redirect_uri
        {
            return Err(deny(Some(client_id), "redirect_uri does not match"));
        }
        if let Some(challenge) = &entry.code_challenge {
            let verifier = request
                .code_verifier
                .as_deref()
                .ok_or_else(|| deny(Some(client_id), "code_verifier is required"))?;
            if !verify_s256(verifier, challenge) {
                return Err(deny(Some(client_id), "code_verifier does not match"));
            }
        }

        let now = unix_now();
        audit::emit(&AuditEvent::code_redeemed(client_id, entry.access_expires_at));
        debug!(client_id, "Authorization code redeemed");

        Ok(TokenPair {
            access_token: entry.access_token,
            token_type: "Bearer".to_string(),
            expires_in: entry.access_expires_at.saturating_sub(now),
            refresh_token: entry.refresh_token,
            scope: entry.scope,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::oauth::pkce::s256_challenge;
    use crate::provider::ProviderRegistry;
    use crate::store::AuthorizationCodeEntry;

    fn core() -> BridgeCore {
        BridgeCore::new(&Config::default(), ProviderRegistry::new()).unwrap()
    }

    fn entry(challenge: Option<String>) -> AuthorizationCodeEntry {
        AuthorizationCodeEntry {
            access_token: "at".to_string(),
            refresh_token: "rt".to_string(),
            access_expires_at: unix_now() + 500,
            scope: "read".to_string(),
            client_id: "client-1".to_string(),
            redirect_uri: "http://localhost:9000/cb".to_string(),
            code_challenge: challenge,
        }
    }

    fn request(code: &str) -> TokenRequest {
        TokenRequest {
            grant_type: Some("authorization_code".to_string()),
            code: Some(code.to_string()),
            client_id: Some("client-1".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn exchange_returns_stored_pair_once() {
        // GIVEN: an issued code without a challenge
        let core = core();
        let code = core.relay().issue(entry(None));

        // WHEN: exchanged twice
        let first = core.exchange_code(&request(&code)).unwrap();
        let second = core.exchange_code(&request(&code)).unwrap_err();

        // THEN: first succeeds with the stored tokens, second is invalid_grant
        assert_eq!(first.access_token, "at");
        assert_eq!(first.token_type, "Bearer");
        assert!(first.expires_in <= 500 && first.expires_in >= 498);
        assert_eq!(second.oauth_code(), "invalid_grant");
    }

    #[test]
    fn exchange_checks_verifier() {
        let core = core();
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";

        let code = core.relay().issue(entry(Some(s256_challenge(verifier))));
        let wrong = TokenRequest {
            code_verifier: Some("wrong".to_string()),
            ..request(&code)
        };
        assert_eq!(core.exchange_code(&wrong).unwrap_err().oauth_code(), "invalid_grant");
        // the failed attempt burned the code
        let right = TokenRequest {
            code_verifier: Some(verifier.to_string()),
            ..request(&code)
        };
        assert!(core.exchange_code(&right).is_err());

        let code = core.relay().issue(entry(Some(s256_challenge(verifier))));
        let right = TokenRequest {
            code_verifier: Some(verifier.to_string()),
            ..request(&code)
        };
        assert!(core.exchange_code(&right).is_ok());
    }

    #[test]
    fn exchange_checks_client_and_redirect() {
        let core = core();

        let code = core.relay().issue(entry(None));
        let other_client = TokenRequest {
            client_id: Some("client-2".to_string()),
            ..request(&code)
        };
        assert_eq!(core.exchange_code(&other_client).unwrap_err().oauth_code(), "invalid_grant");

        let code = core.relay().issue(entry(None));
        let other_redirect = TokenRequest {
            redirect_uri: Some("http://localhost:9000/other".to_string()),
            ..request(&code)
        };
        assert_eq!(core.exchange_code(&other_redirect).unwrap_err().oauth_code(), "invalid_grant");
    }

    #[tokio::test]
    async fn unknown_grant_type_is_rejected() {
        let core = core();
        let err = core
            .token(&TokenRequest {
                grant_type: Some("password".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.oauth_code(), "unsupported_grant_type");

        let err = core.token(&TokenRequest::default()).await.unwrap_err();
        assert_eq!(err.oauth_code(), "invalid_request");
    }
}
