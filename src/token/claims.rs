//! Claim sets carried by bridge tokens.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::provider::{ProviderKey, ProviderRecords};

/// Type marker carried only by refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefreshMarker {
    /// `"type": "refresh_token"`
    #[serde(rename = "refresh_token")]
    RefreshToken,
}

/// Access token claims.
///
/// `providers` embeds every connected provider's full credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (bridge session identity)
    pub sub: String,
    /// Issuer
    pub iss: String,
    /// Audience (client id)
    pub aud: String,
    /// Granted scope
    pub scope: String,
    /// Issued at (Unix seconds)
    pub iat: u64,
    /// Expiry (Unix seconds)
    pub exp: u64,
    /// Per-provider credentials
    pub providers: ProviderRecords,
    /// Present only when a refresh token is decoded as an access token
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

/// Per-provider block inside a refresh token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRefreshBlock {
    /// Upstream refresh token
    pub refresh_token: String,
}

/// Refresh token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// Always [`RefreshMarker::RefreshToken`]
    #[serde(rename = "type")]
    pub token_type: RefreshMarker,
    /// Subject
    pub sub: String,
    /// Issuer
    pub iss: String,
    /// Audience (client id)
    pub aud: String,
    /// Granted scope
    pub scope: String,
    /// Issued at (Unix seconds)
    pub iat: u64,
    /// Expiry (Unix seconds)
    pub exp: u64,
    /// Per-provider refresh credentials
    pub providers: BTreeMap<ProviderKey, ProviderRefreshBlock>,
}

impl RefreshClaims {
    /// Non-empty provider refresh tokens, by provider.
    #[must_use]
    pub fn refresh_tokens(&self) -> BTreeMap<ProviderKey, String> {
        self.providers
            .iter()
            .filter(|(_, block)| !block.refresh_token.is_empty())
            .map(|(key, block)| (*key, block.refresh_token.clone()))
            .collect()
    }
}
