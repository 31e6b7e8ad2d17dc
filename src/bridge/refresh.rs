//! `refresh_token` grant.

use std::collections::HashSet;

use tracing::{info, warn};

use super::BridgeCore;
use super::audit::{self, AuditEvent};
use super::exchange::{TokenRequest, param};
use crate::provider::{RefreshError, refresh_all};
use crate::token::{MintRequest, TokenPair};
use crate::{Error, Result, unix_now};

/// `requested` narrowed to a subset of `granted`, or `None` if it asks for more.
fn narrow_scope<'a>(requested: Option<&'a str>, granted: &'a str) -> Option<&'a str> {
    let Some(requested) = requested.filter(|s| !s.trim().is_empty()) else {
        return Some(granted);
    };
    let granted: HashSet<&str> = granted.split_whitespace().collect();
    requested
        .split_whitespace()
        .all(|s| granted.contains(s))
        .then_some(requested)
}

impl BridgeCore {
    /// Refresh every embedded provider and mint a new pair.
    ///
    /// All-or-nothing: if any provider fails, nothing is returned.
    pub async fn refresh(&self, request: &TokenRequest) -> Result<TokenPair> {
        let token = param(request.refresh_token.as_ref(), "refresh_token")?;
        let client_id = param(request.client_id.as_ref(), "client_id")?;

        let claims = self.tokens.verify_refresh(token).inspect_err(|e| {
            audit::emit(&AuditEvent::denied(Some(client_id), e.public_description()));
        })?;
        if claims.aud != client_id {
            audit::emit(&AuditEvent::denied(Some(client_id), "refresh token audience mismatch"));
            return Err(Error::invalid_grant("Refresh token was issued to another client"));
        }

        let scope = narrow_scope(request.scope.as_deref(), &claims.scope)
            .ok_or_else(|| Error::invalid_request("Requested scope exceeds the granted scope"))?
            .to_string();

        let outcome = refresh_all(&self.providers, &claims.refresh_tokens())
            .await
            .map_err(|e| {
                warn!(client_id, error = %e, "Refresh failed");
                audit::emit(&AuditEvent::denied(Some(client_id), e.to_string()));
                match e {
                    RefreshError::NothingToRefresh => {
                        Error::invalid_grant("Refresh token carries no provider credentials")
                    }
                    RefreshError::ProviderFailed { provider, .. } => Error::invalid_grant(format!(
                        "Refresh failed for {provider}; reauthorize"
                    )),
                }
            })?;

        let pair = self.tokens.mint_pair(
            MintRequest {
                subject: &claims.sub,
                client_id,
                scope: &scope,
                records: &outcome.records,
                rotating: &outcome.rotating,
            },
            unix_now(),
        )?;

        let providers = outcome.records.keys().copied().collect();
        audit::emit(&AuditEvent::refreshed(client_id, &claims.sub, providers));
        info!(client_id, expires_in = pair.expires_in, "Bridge tokens refreshed");
        Ok(pair)
    }
}
