//! Upstream provider adapters.
//!
//! Every upstream identity provider is reached through a [`ProviderAdapter`].
//! The bridge core never sees provider-specific error shapes: adapters report
//! a [`ProviderError`], which the core maps into the OAuth error taxonomy.
//!
//! The set of providers is closed ([`ProviderKey`]), so per-provider blocks in
//! bridge tokens are maps keyed by an enum rather than free-form JSON objects.

pub mod http;
pub mod refresh;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ProviderConfig;

pub use http::HttpProviderAdapter;
pub use refresh::{RefreshError, RefreshOutcome, refresh_all};

/// Known upstream providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKey {
    /// Issue tracker
    IssueTracker,
    /// Design tool
    DesignTool,
    /// Document store
    DocumentStore,
}

impl ProviderKey {
    /// All known providers, in canonical order.
    pub const ALL: [ProviderKey; 3] = [Self::IssueTracker, Self::DesignTool, Self::DocumentStore];

    /// Wire name used in URLs and token claims.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IssueTracker => "issue_tracker",
            Self::DesignTool => "design_tool",
            Self::DocumentStore => "document_store",
        }
    }
}

impl fmt::Display for ProviderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKey {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ProviderError::Unknown(s.to_string()))
    }
}

/// Credentials obtained from one upstream provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderTokenRecord {
    /// Upstream access token
    pub access_token: String,
    /// Upstream refresh token (absent when the provider omitted it)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Access token expiry (Unix seconds)
    pub expires_at: u64,
    /// Granted scope
    #[serde(default)]
    pub scope: String,
}

impl ProviderTokenRecord {
    /// Refresh token, treating an empty string as absent.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Provider failures, classified by whether the caller may retry.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// Upstream answered 4xx (e.g. `invalid_grant`). Not retryable: that
    /// provider's authorization has to be restarted.
    #[error("upstream rejected the request: {error}")]
    Rejected {
        /// Upstream OAuth error code
        error: String,
        /// Upstream error description, if any
        description: Option<String>,
    },

    /// Upstream answered 5xx or could not be reached. Retryable.
    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    /// Upstream answered 2xx with a body that is not a token response.
    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),

    /// No adapter registered for this provider.
    #[error("unknown provider: {0}")]
    Unknown(String),
}

impl ProviderError {
    /// Whether the caller may retry the same call later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::InvalidResponse(_))
    }
}

/// Uniform contract implemented by every upstream provider.
#[async_trait]
pub trait ProviderAdapter: Send + Sync + 'static {
    /// Which provider this adapter talks to.
    fn key(&self) -> ProviderKey;

    /// Whether the provider issues a new refresh token on every refresh.
    ///
    /// Static providers may omit the refresh token from refresh responses;
    /// the previous one then stays valid and must be carried forward.
    fn refresh_token_rotates(&self) -> bool;

    /// Scopes this provider can grant.
    fn supported_scopes(&self) -> &[String];

    /// Exchange an upstream authorization code.
    async fn exchange_code(
        &self,
        code: &str,
        verifier: Option<&str>,
    ) -> Result<ProviderTokenRecord, ProviderError>;

    /// Obtain fresh credentials from a refresh token.
    async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<ProviderTokenRecord, ProviderError>;
}

/// Adapters by provider key.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    adapters: HashMap<ProviderKey, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build HTTP adapters for every enabled provider in the configuration.
    pub fn from_config(
        providers: &HashMap<ProviderKey, ProviderConfig>,
        http: &reqwest::Client,
    ) -> Self {
        let mut registry = Self::new();
        for (key, config) in providers.iter().filter(|(_, c)| c.enabled) {
            registry.register(Arc::new(HttpProviderAdapter::new(
                *key,
                config.clone(),
                http.clone(),
            )));
            info!(
                provider = %key,
                rotates = config.refresh_token_rotates,
                "Registered provider"
            );
        }
        registry
    }

    /// Register (or replace) an adapter.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.key(), adapter);
    }

    /// Look up an adapter.
    #[must_use]
    pub fn get(&self, key: ProviderKey) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&key).cloned()
    }

    /// Keys of all registered providers, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<ProviderKey> {
        let mut keys: Vec<_> = self.adapters.keys().copied().collect();
        keys.sort();
        keys
    }

    /// Union of all providers' supported scopes.
    #[must_use]
    pub fn supported_scopes(&self) -> Vec<String> {
        let mut scopes: Vec<String> = self
            .adapters
            .values()
            .flat_map(|a| a.supported_scopes().iter().cloned())
            .collect();
        scopes.sort();
        scopes.dedup();
        scopes
    }
}

/// Provider records accumulated for one session, keyed by provider.
pub type ProviderRecords = BTreeMap<ProviderKey, ProviderTokenRecord>;
