//! `GET /authorize`: open a pending session and hand off to the connection UI.

use serde::Deserialize;
use tracing::info;
use url::Url;

use super::BridgeCore;
use crate::oauth::PkceFlow;
use crate::oauth::pkce::S256;
use crate::store::PendingAuthorizationSession;
use crate::{Error, Result};

/// Authorization request query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizeRequest {
    /// Client id
    pub client_id: Option<String>,
    /// Absolute redirect URI
    pub redirect_uri: Option<String>,
    /// Requested scope
    pub scope: Option<String>,
    /// Must be `code`
    pub response_type: Option<String>,
    /// Client CSRF state
    pub state: Option<String>,
    /// Client S256 challenge
    pub code_challenge: Option<String>,
    /// Must be `S256` when present
    pub code_challenge_method: Option<String>,
    /// RFC 8707 resource indicator
    pub resource: Option<String>,
}

/// A session was opened.
#[derive(Debug, Clone)]
pub struct AuthorizationStarted {
    /// Session id (goes into the cookie)
    pub session_id: String,
    /// Where the browser goes next
    pub connect_url: Url,
}

/// Parse and check a client redirect URI.
pub(crate) fn parse_redirect_uri(uri: &str) -> Result<Url> {
    let url = Url::parse(uri)
        .map_err(|e| Error::invalid_request(format!("redirect_uri must be an absolute URL: {e}")))?;
    if url.fragment().is_some() {
        return Err(Error::invalid_request("redirect_uri must not contain a fragment"));
    }
    Ok(url)
}

fn required(value: Option<String>, name: &str) -> Result<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::invalid_request(format!("{name} is required")))
}

impl BridgeCore {
    /// Validate an authorization request and open a session for it.
    pub fn authorize(&self, request: AuthorizeRequest) -> Result<AuthorizationStarted> {
        let client_id = required(request.client_id, "client_id")?;
        let redirect_uri = required(request.redirect_uri, "redirect_uri")?;
        parse_redirect_uri(&redirect_uri)?;

        match request.response_type.as_deref() {
            Some("code") => {}
            Some(other) => {
                return Err(Error::invalid_request(format!(
                    "unsupported response_type {other:?}"
                )));
            }
            None => return Err(Error::invalid_request("response_type is required")),
        }

        if let Some(method) = request.code_challenge_method.as_deref()
            && method != S256
        {
            return Err(Error::invalid_request(format!(
                "code_challenge_method must be S256, got {method:?}"
            )));
        }

        let pkce = PkceFlow::select(request.code_challenge.as_deref());
        let state = request.state.filter(|s| !s.is_empty());
        // Without a client challenge the callback relies on state alone
        if pkce.using_own_pkce() && state.is_none() {
            return Err(Error::invalid_request(
                "state is required when no code_challenge is supplied",
            ));
        }

        let scope = request
            .scope
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.default_scope());

        let session = PendingAuthorizationSession::new(
            client_id,
            redirect_uri,
            state,
            scope,
            request.resource,
            pkce,
        );

        let mut connect_url = self.connect_ui.clone();
        connect_url
            .query_pairs_mut()
            .append_pair("session", &session.id)
            .append_pair("code_challenge", &session.pkce.code_challenge());

        info!(
            client_id = %session.client_id,
            own_pkce = session.pkce.using_own_pkce(),
            "Authorization session opened"
        );

        let session_id = session.id.clone();
        self.sessions.insert(session);

        Ok(AuthorizationStarted {
            session_id,
            connect_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::provider::ProviderRegistry;

    fn core() -> BridgeCore {
        BridgeCore::new(&Config::default(), ProviderRegistry::new()).unwrap()
    }

    fn request() -> AuthorizeRequest {
        AuthorizeRequest {
            client_id: Some("client-1".to_string()),
            redirect_uri: Some("http://localhost:9000/cb".to_string()),
            response_type: Some("code".to_string()),
            state: Some("xyz".to_string()),
            code_challenge: Some("E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".to_string()),
            code_challenge_method: Some("S256".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn authorize_opens_relay_session() {
        // GIVEN: a request with a client challenge
        let core = core();

        // WHEN: authorizing
        let started = core.authorize(request()).unwrap();

        // THEN: the UI gets the session id and the client's challenge
        let query: Vec<(String, String)> = started.connect_url.query_pairs().into_owned().collect();
        assert!(query.contains(&("session".to_string(), started.session_id.clone())));
        assert!(query.contains(&(
            "code_challenge".to_string(),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".to_string()
        )));
        let session = core.sessions().get(&started.session_id).unwrap();
        assert!(!session.pkce.using_own_pkce());
        assert_eq!(session.state.as_deref(), Some("xyz"));
    }

    #[test]
    fn authorize_without_challenge_generates_pair() {
        let core = core();
        let started = core
            .authorize(AuthorizeRequest {
                code_challenge: None,
                code_challenge_method: None,
                ..request()
            })
            .unwrap();

        let session = core.sessions().get(&started.session_id).unwrap();
        assert!(session.pkce.using_own_pkce());
    }

    #[test]
    fn authorize_rejects_bad_requests() {
        let core = core();
        let cases = [
            AuthorizeRequest { client_id: None, ..request() },
            AuthorizeRequest { redirect_uri: Some("/relative".to_string()), ..request() },
            AuthorizeRequest { response_type: Some("token".to_string()), ..request() },
            AuthorizeRequest { code_challenge_method: Some("plain".to_string()), ..request() },
            AuthorizeRequest { code_challenge: None, state: None, ..request() },
        ];

        for case in cases {
            let err = core.authorize(case).unwrap_err();
            assert_eq!(err.oauth_code(), "invalid_request");
        }
    }
}
