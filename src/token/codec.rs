//! HS256 signing and verification of bridge tokens.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use super::claims::{AccessClaims, RefreshClaims};
use crate::{Error, Result};

/// Signs and verifies bridge tokens with a shared secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Create a codec for tokens issued by `issuer`.
    #[must_use]
    pub fn new(secret: &[u8], issuer: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        // aud is the client id and is compared by the caller
        validation.validate_aud = false;
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Sign a claim set.
    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String> {
        Ok(encode(&Header::new(Algorithm::HS256), claims, &self.encoding)?)
    }

    fn verify<T: DeserializeOwned>(
        &self,
        token: &str,
    ) -> std::result::Result<T, jsonwebtoken::errors::Error> {
        decode::<T>(token, &self.decoding, &self.validation).map(|data| data.claims)
    }

    /// Verify an access token. Refresh tokens are rejected.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims> {
        let claims: AccessClaims = self
            .verify(token)
            .map_err(|e| Error::invalid_grant(format!("Invalid access token: {e}")))?;
        if claims.token_type.is_some() {
            return Err(Error::invalid_grant("Not an access token"));
        }
        Ok(claims)
    }

    /// Verify a refresh token. Access tokens are rejected (no `type` marker).
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims> {
        self.verify(token)
            .map_err(|e| Error::invalid_grant(format!("Invalid refresh token: {e}")))
    }
}

#[derive(Deserialize)]
struct ExpOnly {
    exp: u64,
}

/// Read `exp` from a JWT payload without verifying its signature.
///
/// Used on upstream credentials we cannot verify; `None` for anything that
/// is not a decodable JWT with a numeric `exp`.
#[must_use]
pub fn unverified_exp(token: &str) -> Option<u64> {
    let mut parts = token.splitn(3, '.');
    let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);

    let payload = base64::Engine::decode(
        &base64::engine::general_purpose::URL_SAFE_NO_PAD,
        payload.trim_end_matches('='),
    )
    .ok()?;
    serde_json::from_slice::<ExpOnly>(&payload).ok().map(|c| c.exp)
}
