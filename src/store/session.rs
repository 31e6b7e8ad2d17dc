//! Pending authorization sessions.

use std::sync::Arc;
use std::time::Duration;

use super::{Sweep, TtlStore, generate_key};
use crate::oauth::PkceFlow;
use crate::provider::{ProviderKey, ProviderRecords, ProviderTokenRecord};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// Providers are being connected.
    Connecting,
    /// Tokens minted; the code waits to be relayed through `/callback`.
    AwaitingCallback {
        /// Issued relay code
        code: String,
    },
}

/// State carried between `/authorize` and `/callback`.
#[derive(Debug, Clone)]
pub struct PendingAuthorizationSession {
    /// Session id
    pub id: String,
    /// Requesting client
    pub client_id: String,
    /// Where the client wants the result
    pub redirect_uri: String,
    /// Client CSRF state
    pub state: Option<String>,
    /// Requested scope
    pub scope: String,
    /// RFC 8707 resource indicator
    pub resource: Option<String>,
    /// PKCE flow
    pub pkce: PkceFlow,
    /// Connected providers so far
    pub connections: ProviderRecords,
    /// Connected providers whose refresh tokens rotate
    pub rotating: Vec<ProviderKey>,
    /// Bridge subject minted tokens are issued for
    pub subject: String,
    /// Lifecycle phase
    pub phase: SessionPhase,
}

impl PendingAuthorizationSession {
    /// Start a session with a fresh id and subject.
    #[must_use]
    pub fn new(
        client_id: String,
        redirect_uri: String,
        state: Option<String>,
        scope: String,
        resource: Option<String>,
        pkce: PkceFlow,
    ) -> Self {
        Self {
            id: generate_key(),
            client_id,
            redirect_uri,
            state,
            scope,
            resource,
            pkce,
            connections: ProviderRecords::new(),
            rotating: Vec::new(),
            subject: uuid::Uuid::new_v4().to_string(),
            phase: SessionPhase::Connecting,
        }
    }

    /// Record (or replace) one provider's credentials.
    pub fn connect(&mut self, key: ProviderKey, record: ProviderTokenRecord, rotates: bool) {
        self.connections.insert(key, record);
        self.rotating.retain(|k| *k != key);
        if rotates {
            self.rotating.push(key);
        }
    }

    /// Connected providers, in key order.
    #[must_use]
    pub fn connected(&self) -> Vec<ProviderKey> {
        self.connections.keys().copied().collect()
    }
}

/// Store of pending sessions.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<TtlStore<PendingAuthorizationSession>>,
}

impl SessionStore {
    /// Create a store whose sessions live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(TtlStore::new(ttl)),
        }
    }

    /// Persist a session under its id.
    pub fn insert(&self, session: PendingAuthorizationSession) {
        let id = session.id.clone();
        self.sessions.set(id, session);
    }

    /// Snapshot of a live session.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<PendingAuthorizationSession> {
        self.sessions.get(id)
    }

    /// Mutate a live session.
    pub fn update<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut PendingAuthorizationSession) -> R,
    ) -> Option<R> {
        self.sessions.update(id, f)
    }

    /// Remove and return a live session.
    pub fn take(&self, id: &str) -> Option<PendingAuthorizationSession> {
        self.sessions.take(id)
    }

    /// Session lifetime
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.sessions.ttl()
    }
}

impl Sweep for SessionStore {
    fn name(&self) -> &'static str {
        "sessions"
    }

    fn sweep(&self) -> usize {
        self.sessions.sweep_at(crate::unix_now())
    }
}
