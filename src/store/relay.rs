//! Single-use authorization codes.
//!
//! A code maps to an already-minted token pair. Redeeming it never calls
//! upstream; the only work left at the token endpoint is checking that the
//! redeemer is the client the code was issued to.

use std::sync::Arc;
use std::time::Duration;

use super::{Sweep, TtlStore, generate_key};

/// What a relay code stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCodeEntry {
    /// Minted access token
    pub access_token: String,
    /// Minted refresh token
    pub refresh_token: String,
    /// `exp` of the access token
    pub access_expires_at: u64,
    /// Granted scope
    pub scope: String,
    /// Client the code was issued to
    pub client_id: String,
    /// Redirect URI the code was delivered to
    pub redirect_uri: String,
    /// Client S256 challenge (relay flow only)
    pub code_challenge: Option<String>,
}

/// Store of issued codes.
#[derive(Debug, Clone)]
pub struct RelayStore {
    codes: Arc<TtlStore<AuthorizationCodeEntry>>,
}

impl RelayStore {
    /// Create a store whose codes live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            codes: Arc::new(TtlStore::new(ttl)),
        }
    }

    /// Fresh random code.
    #[must_use]
    pub fn generate() -> String {
        generate_key()
    }

    /// Store an entry under `code`. Returns the code's expiry.
    pub fn store(&self, code: &str, entry: AuthorizationCodeEntry) -> u64 {
        self.codes.set(code, entry)
    }

    /// Store as if at `now`.
    pub fn store_at(&self, code: &str, entry: AuthorizationCodeEntry, now: u64) -> u64 {
        self.codes.set_at(code, entry, now)
    }

    /// Generate a code and store `entry` under it.
    pub fn issue(&self, entry: AuthorizationCodeEntry) -> String {
        let code = Self::generate();
        self.store(&code, entry);
        code
    }

    /// Redeem a code. A second redemption of the same code returns `None`.
    pub fn consume(&self, code: &str) -> Option<AuthorizationCodeEntry> {
        self.codes.take(code)
    }

    /// Redeem as if at `now`.
    pub fn consume_at(&self, code: &str, now: u64) -> Option<AuthorizationCodeEntry> {
        self.codes.take_at(code, now)
    }

    /// Outstanding codes, including expired ones not yet swept.
    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// `true` when no code is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl Sweep for RelayStore {
    fn name(&self) -> &'static str {
        "relay"
    }

    fn sweep(&self) -> usize {
        self.codes.sweep_at(crate::unix_now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unix_now;

    fn entry() -> AuthorizationCodeEntry {
        AuthorizationCodeEntry {
            access_token: "at".to_string(),
            refresh_token: "rt".to_string(),
            access_expires_at: unix_now() + 600,
            scope: "read".to_string(),
            client_id: "client-1".to_string(),
            redirect_uri: "https://client.example/cb".to_string(),
            code_challenge: None,
        }
    }

    #[test]
    fn code_is_single_use() {
        // GIVEN: an issued code
        let store = RelayStore::new(Duration::from_secs(600));
        let code = store.issue(entry());

        // WHEN: redeemed twice
        // THEN: the first redemption wins, the second misses
        assert_eq!(store.consume(&code), Some(entry()));
        assert_eq!(store.consume(&code), None);
    }

    #[test]
    fn code_stored_eleven_minutes_ago_is_dead() {
        // GIVEN: a code stored 11 minutes ago with a 10 minute TTL
        let store = RelayStore::new(Duration::from_secs(600));
        let now = unix_now();
        store.store_at("old", entry(), now - 11 * 60);

        // THEN: it cannot be consumed
        assert_eq!(store.consume_at("old", now), None);
    }

    #[test]
    fn code_expires_one_second_after_ttl() {
        let store = RelayStore::new(Duration::from_secs(600));
        let now = unix_now();
        store.store_at("edge", entry(), now - 601);
        store.store_at("live", entry(), now - 599);

        assert_eq!(store.consume_at("edge", now), None);
        assert!(store.consume_at("live", now).is_some());
    }

    #[test]
    fn sweep_purges_expired_codes() {
        let store = RelayStore::new(Duration::from_secs(600));
        let now = unix_now();
        store.store_at("old", entry(), now - 700);
        store.issue(entry());

        assert_eq!(store.sweep(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_redemption_has_one_winner() {
        // GIVEN: one code and many concurrent redeemers
        let store = RelayStore::new(Duration::from_secs(600));
        let code = store.issue(entry());

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                let code = code.clone();
                tokio::spawn(async move { store.consume(&code).is_some() })
            })
            .collect();

        // WHEN: all finish
        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap() {
                winners += 1;
            }
        }

        // THEN: exactly one got the entry
        assert_eq!(winners, 1);
    }
}
