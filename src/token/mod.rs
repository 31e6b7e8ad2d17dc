//! Bridge token minting.
//!
//! An access token embeds every connected provider's credentials and must
//! never outlive the earliest of them. A refresh token embeds only the
//! upstream refresh tokens and lives as long as the upstream allows.

pub mod claims;
pub mod codec;

use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::config::TokensConfig;
use crate::provider::{ProviderKey, ProviderRecords};
use crate::{Error, Result};

pub use claims::{AccessClaims, ProviderRefreshBlock, RefreshClaims, RefreshMarker};
pub use codec::{TokenCodec, unverified_exp};

/// Lifetime rules for minted tokens.
#[derive(Debug, Clone)]
pub struct LifetimePolicy {
    /// Subtracted from the earliest provider expiry
    pub expiry_buffer: Duration,
    /// When set, access tokens are additionally capped at `test_access_ttl`
    pub test_mode: bool,
    /// Access lifetime cap in test mode
    pub test_access_ttl: Duration,
    /// Refresh lifetime when no rotating provider dictates one
    pub refresh_fallback_ttl: Duration,
}

impl From<&TokensConfig> for LifetimePolicy {
    fn from(config: &TokensConfig) -> Self {
        Self {
            expiry_buffer: config.expiry_buffer,
            test_mode: config.test_mode,
            test_access_ttl: config.test_access_ttl,
            refresh_fallback_ttl: config.refresh_fallback_ttl,
        }
    }
}

impl LifetimePolicy {
    /// Access token `exp`: earliest provider expiry minus the buffer.
    ///
    /// Never earlier than `now`; an already-expiring provider yields a token
    /// that is immediately due for refresh.
    pub fn access_expiry(&self, now: u64, records: &ProviderRecords) -> Result<u64> {
        let earliest = records
            .values()
            .map(|r| r.expires_at)
            .min()
            .ok_or_else(|| Error::Internal("cannot mint a token without providers".to_string()))?;

        let mut exp = earliest.saturating_sub(self.expiry_buffer.as_secs());
        if self.test_mode {
            exp = exp.min(now + self.test_access_ttl.as_secs());
        }
        Ok(exp.max(now))
    }

    /// Refresh token `exp`.
    ///
    /// The first rotating provider whose refresh token is a JWT with a future
    /// `exp` dictates the lifetime; otherwise `now + refresh_fallback_ttl`.
    #[must_use]
    pub fn refresh_expiry(
        &self,
        now: u64,
        records: &ProviderRecords,
        rotating: &[ProviderKey],
    ) -> u64 {
        let dictated = records
            .iter()
            .filter(|(key, _)| rotating.contains(key))
            .filter_map(|(key, record)| {
                let exp = unverified_exp(record.refresh_token()?)?;
                (exp > now).then(|| {
                    debug!(provider = %key, exp, "Refresh lifetime taken from provider");
                    exp
                })
            })
            .next();

        dictated.unwrap_or(now + self.refresh_fallback_ttl.as_secs())
    }
}

/// Everything needed to mint a token pair.
#[derive(Debug, Clone, Copy)]
pub struct MintRequest<'a> {
    /// Subject
    pub subject: &'a str,
    /// Client id (becomes `aud`)
    pub client_id: &'a str,
    /// Granted scope
    pub scope: &'a str,
    /// Provider credentials to embed
    pub records: &'a ProviderRecords,
    /// Providers whose refresh tokens rotate
    pub rotating: &'a [ProviderKey],
}

/// OAuth token endpoint response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct TokenPair {
    /// Signed access token
    pub access_token: String,
    /// Always `Bearer`
    pub token_type: String,
    /// Seconds until the access token's own `exp`
    pub expires_in: u64,
    /// Signed refresh token
    pub refresh_token: String,
    /// Granted scope
    pub scope: String,
}

/// Mints and verifies bridge tokens.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    codec: TokenCodec,
    issuer: String,
    policy: LifetimePolicy,
}

impl TokenIssuer {
    /// Create an issuer.
    #[must_use]
    pub fn new(secret: &[u8], issuer: &str, policy: LifetimePolicy) -> Self {
        Self {
            codec: TokenCodec::new(secret, issuer),
            issuer: issuer.to_string(),
            policy,
        }
    }

    /// Mint an access/refresh pair at time `now`.
    pub fn mint_pair(&self, request: MintRequest<'_>, now: u64) -> Result<TokenPair> {
        let access_exp = self.policy.access_expiry(now, request.records)?;
        let refresh_exp = self
            .policy
            .refresh_expiry(now, request.records, request.rotating);

        let access = AccessClaims {
            sub: request.subject.to_string(),
            iss: self.issuer.clone(),
            aud: request.client_id.to_string(),
            scope: request.scope.to_string(),
            iat: now,
            exp: access_exp,
            providers: request.records.clone(),
            token_type: None,
        };

        let refresh = RefreshClaims {
            token_type: RefreshMarker::RefreshToken,
            sub: request.subject.to_string(),
            iss: self.issuer.clone(),
            aud: request.client_id.to_string(),
            scope: request.scope.to_string(),
            iat: now,
            exp: refresh_exp,
            providers: request
                .records
                .iter()
                .filter_map(|(key, record)| {
                    record.refresh_token().map(|rt| {
                        (
                            *key,
                            ProviderRefreshBlock {
                                refresh_token: rt.to_string(),
                            },
                        )
                    })
                })
                .collect(),
        };

        Ok(TokenPair {
            access_token: self.codec.sign(&access)?,
            token_type: "Bearer".to_string(),
            expires_in: access.exp.saturating_sub(now),
            refresh_token: self.codec.sign(&refresh)?,
            scope: request.scope.to_string(),
        })
    }

    /// Verify an access token.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims> {
        self.codec.verify_access(token)
    }

    /// Verify a refresh token.
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims> {
        self.codec.verify_refresh(token)
    }
}
