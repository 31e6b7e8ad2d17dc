//! Connection reporting: the UI reports each provider it connected, then
//! completes or aborts the session.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use super::BridgeCore;
use super::audit::{self, AuditEvent};
use super::authorize::parse_redirect_uri;
use crate::oauth::PkceFlow;
use crate::provider::{ProviderKey, ProviderTokenRecord};
use crate::store::{AuthorizationCodeEntry, PendingAuthorizationSession, SessionPhase};
use crate::token::MintRequest;
use crate::{Error, Result, unix_now};

/// Body of `POST /connections/{provider}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionReport {
    /// Upstream authorization code
    pub code: String,
    /// Verifier for the upstream exchange (defaults to the server-held one)
    #[serde(default)]
    pub code_verifier: Option<String>,
    /// Session id when no cookie is available
    #[serde(default)]
    pub session: Option<String>,
}

/// Response of `POST /connections/{provider}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// Provider just connected
    pub provider: ProviderKey,
    /// Every provider connected so far
    pub connected: Vec<ProviderKey>,
}

fn unknown_session() -> Error {
    Error::invalid_request("Unknown or expired session")
}

impl BridgeCore {
    fn connecting_session(&self, session_id: &str) -> Result<PendingAuthorizationSession> {
        let session = self.sessions.get(session_id).ok_or_else(unknown_session)?;
        if session.phase != SessionPhase::Connecting {
            return Err(Error::invalid_request("Session already completed"));
        }
        Ok(session)
    }

    /// Exchange an upstream code for `provider` and add it to the session.
    pub async fn connect_provider(
        &self,
        session_id: &str,
        provider: ProviderKey,
        report: &ConnectionReport,
    ) -> Result<ConnectionStatus> {
        let session = self.connecting_session(session_id)?;
        let adapter = self
            .providers
            .get(provider)
            .ok_or_else(|| {
                Error::invalid_request(format!("Provider {provider} is not configured"))
            })?;

        let verifier = report
            .code_verifier
            .as_deref()
            .filter(|v| !v.is_empty())
            .or_else(|| session.pkce.verifier());

        let record = adapter
            .exchange_code(&report.code, verifier)
            .await
            .inspect_err(|e| {
                warn!(provider = %provider, error = %e, "Provider code exchange failed");
            })?;

        self.record_connection(session_id, provider, record)
    }

    /// Add already-obtained provider credentials to a session.
    pub fn record_connection(
        &self,
        session_id: &str,
        provider: ProviderKey,
        record: ProviderTokenRecord,
    ) -> Result<ConnectionStatus> {
        self.connecting_session(session_id)?;
        let rotates = self
            .providers
            .get(provider)
            .ok_or_else(|| {
                Error::invalid_request(format!("Provider {provider} is not configured"))
            })?
            .refresh_token_rotates();

        let connected = self
            .sessions
            .update(session_id, |s| {
                s.connect(provider, record, rotates);
                s.connected()
            })
            .ok_or_else(unknown_session)?;

        info!(provider = %provider, connected = connected.len(), "Provider connected");
        Ok(ConnectionStatus { provider, connected })
    }

    /// Mint the token pair for a session and return the callback URL.
    ///
    /// Completing twice returns the same callback URL.
    pub fn complete(&self, session_id: &str) -> Result<Url> {
        let session = self.sessions.get(session_id).ok_or_else(unknown_session)?;
        if let SessionPhase::AwaitingCallback { code } = &session.phase {
            return self.callback_url(code, session.state.as_deref());
        }
        if session.connections.is_empty() {
            return Err(Error::invalid_request("No provider connected"));
        }

        let now = unix_now();
        let pair = self.tokens.mint_pair(
            MintRequest {
                subject: &session.subject,
                client_id: &session.client_id,
                scope: &session.scope,
                records: &session.connections,
                rotating: &session.rotating,
            },
            now,
        )?;

        let code = self.relay.issue(AuthorizationCodeEntry {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            access_expires_at: now + pair.expires_in,
            scope: pair.scope,
            client_id: session.client_id.clone(),
            redirect_uri: session.redirect_uri.clone(),
            code_challenge: match &session.pkce {
                PkceFlow::Relay { code_challenge } => Some(code_challenge.clone()),
                PkceFlow::DirectExchange { .. } => None,
            },
        });

        // Another request may have completed concurrently; the first code wins
        let winner = self
            .sessions
            .update(session_id, |s| {
                if let SessionPhase::AwaitingCallback { code: existing } = &s.phase {
                    return existing.clone();
                }
                s.phase = SessionPhase::AwaitingCallback { code: code.clone() };
                code.clone()
            })
            .ok_or_else(unknown_session)?;
        if winner != code {
            self.relay.consume(&code);
            return self.callback_url(&winner, session.state.as_deref());
        }

        audit::emit(&AuditEvent::code_issued(
            &session.client_id,
            &session.subject,
            session.connected(),
        ));
        self.callback_url(&code, session.state.as_deref())
    }

    /// Abandon a session and return the client error redirect.
    pub fn abort(&self, session_id: &str) -> Result<Url> {
        let session = self.sessions.take(session_id).ok_or_else(unknown_session)?;
        if let SessionPhase::AwaitingCallback { code } = &session.phase {
            self.relay.consume(code);
        }

        let mut url = parse_redirect_uri(&session.redirect_uri)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("error", "access_denied");
            query.append_pair("error_description", "The user cancelled the authorization");
            if let Some(state) = &session.state {
                query.append_pair("state", state);
            }
        }
        info!(client_id = %session.client_id, "Authorization aborted");
        Ok(url)
    }

    fn callback_url(&self, code: &str, state: Option<&str>) -> Result<Url> {
        let mut url = self.endpoint("/callback")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("code", code);
            if let Some(state) = state {
                query.append_pair("state", state);
            }
        }
        Ok(url)
    }
}
