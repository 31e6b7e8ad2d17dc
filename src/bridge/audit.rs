//! Audit logging for bridge token lifecycle events.
//!
//! Every event is emitted via `tracing::info!` with a JSON `audit` field.
//! Token values are never logged.
//!
//! # Events
//!
//! | Event | When |
//! |-------|------|
//! | `code.issued` | Tokens minted and stored under a relay code |
//! | `code.redeemed` | A relay code was exchanged at the token endpoint |
//! | `token.refreshed` | A refresh grant produced a new pair |
//! | `token.denied` | A code or refresh grant was rejected |
//! | `callback.relayed` | The callback forwarded a code to the client |
//! | `callback.rejected` | The callback refused to relay |

use serde::Serialize;

use crate::provider::ProviderKey;

/// Structured audit event.
#[derive(Debug, Serialize)]
pub struct AuditEvent {
    /// Event type string (e.g., `"code.issued"`).
    pub event: &'static str,
    /// Client the event concerns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Bridge subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Providers embedded in the minted tokens.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<ProviderKey>,
    /// Access token `exp`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    /// Human-readable reason for denial events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditEvent {
    fn new(event: &'static str) -> Self {
        Self {
            event,
            client_id: None,
            subject: None,
            providers: Vec::new(),
            expires_at: None,
            reason: None,
        }
    }

    /// `code.issued`
    #[must_use]
    pub fn code_issued(client_id: &str, subject: &str, providers: Vec<ProviderKey>) -> Self {
        Self {
            client_id: Some(client_id.to_string()),
            subject: Some(subject.to_string()),
            providers,
            ..Self::new("code.issued")
        }
    }

    /// `code.redeemed`
    #[must_use]
    pub fn code_redeemed(client_id: &str, expires_at: u64) -> Self {
        Self {
            client_id: Some(client_id.to_string()),
            expires_at: Some(expires_at),
            ..Self::new("code.redeemed")
        }
    }

    /// `token.refreshed`
    #[must_use]
    pub fn refreshed(client_id: &str, subject: &str, providers: Vec<ProviderKey>) -> Self {
        Self {
            client_id: Some(client_id.to_string()),
            subject: Some(subject.to_string()),
            providers,
            ..Self::new("token.refreshed")
        }
    }

    /// `token.denied`
    #[must_use]
    pub fn denied(client_id: Option<&str>, reason: impl Into<String>) -> Self {
        Self {
            client_id: client_id.map(ToString::to_string),
            reason: Some(reason.into()),
            ..Self::new("token.denied")
        }
    }

    /// `callback.relayed`
    #[must_use]
    pub fn callback_relayed(client_id: &str) -> Self {
        Self {
            client_id: Some(client_id.to_string()),
            ..Self::new("callback.relayed")
        }
    }

    /// `callback.rejected`
    #[must_use]
    pub fn callback_rejected(client_id: Option<&str>, reason: impl Into<String>) -> Self {
        Self {
            client_id: client_id.map(ToString::to_string),
            reason: Some(reason.into()),
            ..Self::new("callback.rejected")
        }
    }
}

/// Emit an audit event via `tracing::info!` with structured fields.
pub fn emit(event: &AuditEvent) {
    match serde_json::to_string(event) {
        Ok(ref json) => tracing::info!(audit = %json, "bridge audit"),
        Err(ref e) => tracing::warn!(error = %e, "Failed to serialize audit event"),
    }
}
