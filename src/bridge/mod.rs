//! The bridge authorization server.
//!
//! [`BridgeCore`] owns the stores, the provider registry and the token
//! issuer. Its operations are plain methods so they can be driven without
//! HTTP; [`handler`] maps them onto routes and [`server`] runs them.
//!
//! # Flow
//!
//! ```text
//! client ── /authorize ──▶ connection UI ── /connections/{provider} (×N)
//!                                        └─ /connect/complete
//!        ◀─ redirect_uri?code ── /callback ◀┘
//! client ── /access-token (authorization_code | refresh_token)
//! ```

pub mod audit;
pub mod authorize;
pub mod callback;
pub mod connect;
pub mod discovery;
pub mod exchange;
pub mod handler;
pub mod refresh;
pub mod server;

use std::sync::Arc;

use url::Url;

use crate::config::Config;
use crate::provider::ProviderRegistry;
use crate::store::{RelayStore, SessionStore, Sweep};
use crate::token::{LifetimePolicy, TokenIssuer};
use crate::{Error, Result, unix_now};

pub use authorize::{AuthorizationStarted, AuthorizeRequest};
pub use callback::CallbackParams;
pub use connect::{ConnectionReport, ConnectionStatus};
pub use exchange::TokenRequest;
pub use handler::create_router;
pub use server::Bridge;

/// Core bridge state shared by every request.
pub struct BridgeCore {
    issuer: String,
    resource: String,
    scopes: Vec<String>,
    started_at: u64,
    connect_ui: Url,
    cookie_name: String,
    tokens: TokenIssuer,
    providers: ProviderRegistry,
    relay: RelayStore,
    sessions: SessionStore,
}

impl BridgeCore {
    /// Build the core from configuration and a provider registry.
    pub fn new(config: &Config, providers: ProviderRegistry) -> Result<Self> {
        let connect_ui = Url::parse(&config.connect.ui_url)
            .map_err(|e| Error::Config(format!("connect.ui_url is not a URL: {e}")))?;
        let issuer = config.issuer();
        let secret = config.tokens.resolve_signing_secret()?;
        if config.tokens.signing_secret == "auto" {
            tracing::warn!(
                "Signing secret generated at startup; tokens will not survive a restart"
            );
        }

        let scopes = if config.scopes.is_empty() {
            providers.supported_scopes()
        } else {
            config.scopes.clone()
        };

        Ok(Self {
            tokens: TokenIssuer::new(&secret, &issuer, LifetimePolicy::from(&config.tokens)),
            resource: config.resource(),
            issuer,
            scopes,
            started_at: unix_now(),
            connect_ui,
            cookie_name: config.sessions.cookie_name.clone(),
            providers,
            relay: RelayStore::new(config.relay.code_ttl),
            sessions: SessionStore::new(config.sessions.ttl),
        })
    }

    /// Build the core with HTTP adapters for every enabled provider.
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("oauth-bridge/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let providers = ProviderRegistry::from_config(&config.providers, &http);
        Self::new(config, providers)
    }

    /// Issuer identifier
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Name of the session cookie
    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Relay code store
    #[must_use]
    pub fn relay(&self) -> &RelayStore {
        &self.relay
    }

    /// Pending session store
    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Provider registry
    #[must_use]
    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Token issuer
    #[must_use]
    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    /// Stores cleaned by the background sweeper.
    #[must_use]
    pub fn sweepables(&self) -> Vec<Arc<dyn Sweep>> {
        vec![
            Arc::new(self.relay.clone()),
            Arc::new(self.sessions.clone()),
        ]
    }

    /// Scope granted when a client asks for none.
    fn default_scope(&self) -> String {
        self.scopes.join(" ")
    }

    /// Absolute URL of a path on this server.
    fn endpoint(&self, path: &str) -> Result<Url> {
        Url::parse(&format!("{}{path}", self.issuer))
            .map_err(|e| Error::Internal(format!("invalid issuer URL: {e}")))
    }
}
