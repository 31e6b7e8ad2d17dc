//! Expiring in-memory stores.
//!
//! [`TtlStore`] is a `DashMap` keyed by opaque random strings whose entries
//! carry an absolute expiry. Expired entries are never returned; they are
//! evicted lazily on access and in bulk by the background sweeper.
//!
//! Two stores are built on it:
//!
//! - [`RelayStore`]: single-use authorization codes bound to minted tokens
//! - [`SessionStore`]: pending authorization sessions

pub mod relay;
pub mod session;

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use dashmap::DashMap;
use rand::RngExt;
use tracing::debug;

use crate::unix_now;

pub use relay::{AuthorizationCodeEntry, RelayStore};
pub use session::{PendingAuthorizationSession, SessionPhase, SessionStore};

/// Generate an opaque key: 32 random bytes, base64url without padding.
#[must_use]
pub fn generate_key() -> String {
    let random_bytes: [u8; 32] = rand::rng().random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes)
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: u64,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

/// Key/value store with a fixed time-to-live per entry.
#[derive(Debug)]
pub struct TtlStore<V> {
    entries: DashMap<String, Entry<V>>,
    ttl: Duration,
}

impl<V: Clone> TtlStore<V> {
    /// Create an empty store whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Entry lifetime
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert (or replace) `key`, expiring `ttl` from now. Returns the expiry.
    pub fn set(&self, key: impl Into<String>, value: V) -> u64 {
        self.set_at(key, value, unix_now())
    }

    /// Insert as if at time `now`.
    pub fn set_at(&self, key: impl Into<String>, value: V, now: u64) -> u64 {
        let expires_at = now + self.ttl.as_secs();
        self.entries.insert(key.into(), Entry { value, expires_at });
        expires_at
    }

    /// Clone of a live entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, unix_now())
    }

    /// Clone of an entry still live at `now`.
    #[must_use]
    pub fn get_at(&self, key: &str, now: u64) -> Option<V> {
        let entry = self.entries.get(key)?;
        if entry.is_expired(now) {
            drop(entry);
            self.entries.remove_if(key, |_, e| e.is_expired(now));
            debug!("Lazy-evicted expired entry");
            return None;
        }
        Some(entry.value.clone())
    }

    /// Atomically remove and return a live entry.
    ///
    /// Of any number of concurrent callers at most one gets the value.
    pub fn take(&self, key: &str) -> Option<V> {
        self.take_at(key, unix_now())
    }

    /// [`take`](Self::take) evaluated at `now`.
    pub fn take_at(&self, key: &str, now: u64) -> Option<V> {
        let (_, entry) = self.entries.remove(key)?;
        (!entry.is_expired(now)).then_some(entry.value)
    }

    /// Mutate a live entry in place. Expiry is unchanged.
    pub fn update<R>(&self, key: &str, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        let now = unix_now();
        let mut entry = self.entries.get_mut(key)?;
        if entry.is_expired(now) {
            drop(entry);
            self.entries.remove_if(key, |_, e| e.is_expired(now));
            return None;
        }
        Some(f(&mut entry.value))
    }

    /// Remove every entry expired at `now`. Returns how many were removed.
    pub fn sweep_at(&self, now: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries, including not-yet-swept expired ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A store the background sweeper can clean.
pub trait Sweep: Send + Sync + 'static {
    /// Store name for logs
    fn name(&self) -> &'static str;

    /// Remove all expired entries. Returns how many were removed.
    fn sweep(&self) -> usize;
}

/// Spawn a background task that sweeps every store every `interval`.
///
/// The task exits when the `shutdown` receiver fires.
pub fn spawn_sweeper(
    stores: Vec<Arc<dyn Sweep>>,
    interval: Duration,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for store in &stores {
                        let swept = store.sweep();
                        if swept > 0 {
                            debug!(store = store.name(), count = swept, "Swept expired entries");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    debug!("Store sweeper shutting down");
                    break;
                }
            }
        }
    })
}
