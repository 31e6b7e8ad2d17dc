//! `GET /callback`: relay the issued code back to the client.
//!
//! The session is purged whatever the outcome; a failed callback cannot be
//! retried and the client has to start over.

use serde::Deserialize;
use subtle::ConstantTimeEq;
use tracing::warn;
use url::Url;

use super::BridgeCore;
use super::audit::{self, AuditEvent};
use super::authorize::parse_redirect_uri;
use crate::oauth::PkceFlow;
use crate::store::{PendingAuthorizationSession, SessionPhase};
use crate::{Error, Result};

/// Callback query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    /// Relay code
    pub code: Option<String>,
    /// Echoed client state
    pub state: Option<String>,
}

fn ct_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// CSRF check.
///
/// Direct exchange: state must come back and match. Relay: state may be
/// omitted, but a returned one must still match.
fn state_matches(flow: &PkceFlow, stored: Option<&str>, returned: Option<&str>) -> bool {
    match (flow, stored, returned) {
        (_, Some(stored), Some(returned)) => ct_eq(stored, returned),
        (PkceFlow::Relay { .. }, _, None) => true,
        _ => false,
    }
}

impl BridgeCore {
    /// Validate a callback and return the client redirect.
    pub fn relay_callback(&self, session_id: Option<&str>, params: &CallbackParams) -> Result<Url> {
        let session = session_id.and_then(|id| self.sessions.take(id));

        match Self::check_callback(session.as_ref(), params) {
            Ok(url) => {
                if let Some(s) = &session {
                    audit::emit(&AuditEvent::callback_relayed(&s.client_id));
                }
                Ok(url)
            }
            Err(e) => {
                // The issued code must not outlive a rejected callback
                if let Some(PendingAuthorizationSession {
                    phase: SessionPhase::AwaitingCallback { code },
                    ..
                }) = &session
                {
                    self.relay.consume(code);
                }
                warn!(error = %e, "Callback rejected");
                audit::emit(&AuditEvent::callback_rejected(
                    session.as_ref().map(|s| s.client_id.as_str()),
                    e.public_description(),
                ));
                Err(e)
            }
        }
    }

    fn check_callback(
        session: Option<&PendingAuthorizationSession>,
        params: &CallbackParams,
    ) -> Result<Url> {
        let session = session
            .ok_or_else(|| Error::invalid_request("No pending authorization for this browser"))?;
        let code = params
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::invalid_request("Missing code"))?;

        if !state_matches(&session.pkce, session.state.as_deref(), params.state.as_deref()) {
            return Err(Error::invalid_request("State mismatch"));
        }

        match &session.phase {
            SessionPhase::AwaitingCallback { code: issued } if ct_eq(issued, code) => {}
            SessionPhase::AwaitingCallback { .. } => {
                return Err(Error::invalid_request("Code was not issued for this session"));
            }
            SessionPhase::Connecting => {
                return Err(Error::invalid_request("Authorization was not completed"));
            }
        }

        let mut url = parse_redirect_uri(&session.redirect_uri)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("code", code);
            if let Some(state) = &session.state {
                query.append_pair("state", state);
            }
        }
        Ok(url)
    }
}
