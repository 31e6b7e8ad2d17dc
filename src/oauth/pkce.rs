//! PKCE (RFC 7636) helpers and the per-session flow selector.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// The only supported challenge method
pub const S256: &str = "S256";

/// Compute the S256 challenge for a verifier.
#[must_use]
pub fn s256_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Check a verifier against a stored S256 challenge in constant time.
#[must_use]
pub fn verify_s256(verifier: &str, challenge: &str) -> bool {
    s256_challenge(verifier)
        .as_bytes()
        .ct_eq(challenge.as_bytes())
        .into()
}

/// Generate a fresh verifier (32 random bytes, base64url).
#[must_use]
pub fn generate_verifier() -> String {
    let verifier_bytes: [u8; 32] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(verifier_bytes)
}

/// Which of the two legal completion paths a session is on.
///
/// A retained verifier exists only in [`PkceFlow::DirectExchange`], so a
/// session can never claim to relay while also holding a verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "flow", rename_all = "snake_case")]
pub enum PkceFlow {
    /// The calling client supplied its own challenge. Nothing secret is kept
    /// server-side; the code is relayed back and the client proves possession
    /// of the verifier at the token endpoint.
    Relay {
        /// Client-supplied S256 challenge
        code_challenge: String,
    },
    /// The server generated the pair and keeps the verifier.
    DirectExchange {
        /// Server-held verifier
        verifier: String,
    },
}

impl PkceFlow {
    /// Adopt a client challenge, or generate a server-held pair when absent.
    #[must_use]
    pub fn select(client_challenge: Option<&str>) -> Self {
        match client_challenge.filter(|c| !c.is_empty()) {
            Some(challenge) => Self::Relay {
                code_challenge: challenge.to_string(),
            },
            None => Self::DirectExchange {
                verifier: generate_verifier(),
            },
        }
    }

    /// `true` when the server generated its own PKCE pair.
    #[must_use]
    pub fn using_own_pkce(&self) -> bool {
        matches!(self, Self::DirectExchange { .. })
    }

    /// S256 challenge to forward to upstream providers.
    #[must_use]
    pub fn code_challenge(&self) -> String {
        match self {
            Self::Relay { code_challenge } => code_challenge.clone(),
            Self::DirectExchange { verifier } => s256_challenge(verifier),
        }
    }

    /// Server-held verifier, if this flow retains one.
    #[must_use]
    pub fn verifier(&self) -> Option<&str> {
        match self {
            Self::Relay { .. } => None,
            Self::DirectExchange { verifier } => Some(verifier),
        }
    }
}
