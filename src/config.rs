//! Configuration management

use std::{collections::HashMap, env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::provider::ProviderKey;
use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    #[serde(default)]
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Bridge token configuration
    pub tokens: TokensConfig,
    /// Relay (authorization code) store
    pub relay: RelayConfig,
    /// Pending authorization sessions
    pub sessions: SessionsConfig,
    /// External connection UI
    pub connect: ConnectConfig,
    /// Scopes advertised in discovery and granted by default
    pub scopes: Vec<String>,
    /// Upstream providers
    pub providers: HashMap<ProviderKey, ProviderConfig>,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // OAUTH_BRIDGE_TOKENS__SIGNING_SECRET=... -> tokens.signing_secret
        figment = figment.merge(Env::prefixed("OAUTH_BRIDGE_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.load_env_files();
        config.expand_env_vars();
        config.validate()?;

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} in secrets
    fn expand_env_vars(&mut self) {
        let Ok(re) = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}") else {
            return;
        };

        self.tokens.signing_secret = Self::expand_string(&re, &self.tokens.signing_secret);
        for provider in self.providers.values_mut() {
            if let Some(secret) = provider.client_secret.as_mut() {
                *secret = Self::expand_string(&re, secret);
            }
        }
    }

    /// Expand environment variables in a string
    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }

    fn validate(&self) -> Result<()> {
        Url::parse(&self.connect.ui_url)
            .map_err(|e| Error::Config(format!("connect.ui_url is not a URL: {e}")))?;

        for (key, provider) in self.enabled_providers() {
            if provider.token_endpoint.is_empty() {
                return Err(Error::Config(format!(
                    "providers.{key}.token_endpoint is required"
                )));
            }
            if provider.client_id.is_empty() {
                return Err(Error::Config(format!("providers.{key}.client_id is required")));
            }
        }

        self.tokens.resolve_signing_secret()?;

        if self.tokens.expiry_buffer.is_zero() {
            return Err(Error::Config("tokens.expiry_buffer must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Get enabled providers only
    pub fn enabled_providers(&self) -> impl Iterator<Item = (&ProviderKey, &ProviderConfig)> {
        self.providers.iter().filter(|(_, p)| p.enabled)
    }

    /// Issuer identifier; derived from the listen address when unset.
    #[must_use]
    pub fn issuer(&self) -> String {
        match self.server.issuer.as_deref() {
            Some(issuer) if !issuer.is_empty() => issuer.trim_end_matches('/').to_string(),
            _ => format!("http://{}:{}", self.server.host, self.server.port),
        }
    }

    /// Protected resource identifier; defaults to the issuer.
    #[must_use]
    pub fn resource(&self) -> String {
        match self.server.resource.as_deref() {
            Some(resource) if !resource.is_empty() => resource.to_string(),
            _ => self.issuer(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Public issuer URL (defaults to `http://{host}:{port}`)
    pub issuer: Option<String>,
    /// Protected resource identifier (defaults to the issuer)
    pub resource: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            issuer: None,
            resource: None,
        }
    }
}

/// Bridge token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokensConfig {
    /// HS256 signing secret.
    /// Supports `env:VAR_NAME` and `auto` (random per process).
    pub signing_secret: String,
    /// Subtracted from the earliest provider expiry
    #[serde(with = "humantime_serde")]
    pub expiry_buffer: Duration,
    /// Short-lived access tokens for exercising client refresh loops
    pub test_mode: bool,
    /// Access token lifetime cap in test mode
    #[serde(with = "humantime_serde")]
    pub test_access_ttl: Duration,
    /// Refresh token lifetime when no provider dictates one
    #[serde(with = "humantime_serde")]
    pub refresh_fallback_ttl: Duration,
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            signing_secret: "auto".to_string(),
            expiry_buffer: Duration::from_secs(60),
            test_mode: false,
            test_access_ttl: Duration::from_secs(30),
            refresh_fallback_ttl: Duration::from_secs(90 * 24 * 60 * 60),
        }
    }
}

impl TokensConfig {
    /// Resolve the signing secret (supports `env:VAR_NAME` and `auto`).
    ///
    /// An `env:` reference to an unset or empty variable is an error.
    pub fn resolve_signing_secret(&self) -> Result<Vec<u8>> {
        let secret = &self.signing_secret;
        if secret == "auto" || secret.is_empty() {
            use rand::RngExt;
            let random_bytes: [u8; 32] = rand::rng().random();
            Ok(random_bytes.to_vec())
        } else if let Some(var_name) = secret.strip_prefix("env:") {
            match env::var(var_name) {
                Ok(value) if !value.is_empty() => Ok(value.into_bytes()),
                _ => Err(Error::Config(format!(
                    "tokens.signing_secret refers to {var_name}, which is unset or empty"
                ))),
            }
        } else {
            Ok(secret.clone().into_bytes())
        }
    }
}

/// Relay store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Lifetime of an issued authorization code
    #[serde(with = "humantime_serde")]
    pub code_ttl: Duration,
    /// How often expired entries are swept
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            code_ttl: Duration::from_secs(10 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// Pending session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Lifetime of a pending authorization session
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Cookie carrying the session id
    pub cookie_name: String,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30 * 60),
            cookie_name: "bridge_session".to_string(),
        }
    }
}

/// Connection UI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectConfig {
    /// Where `/authorize` sends the browser
    pub ui_url: String,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            ui_url: "http://127.0.0.1:3000/connect".to_string(),
        }
    }
}

/// Upstream provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Enabled flag
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// OAuth token endpoint
    pub token_endpoint: String,
    /// Client id registered with the provider
    pub client_id: String,
    /// Client secret (supports `${VAR}`); omit for public clients
    pub client_secret: Option<String>,
    /// Redirect URI sent with code exchanges
    pub redirect_uri: Option<String>,
    /// Scopes this provider can grant
    pub scopes: Vec<String>,
    /// Whether every refresh returns a new refresh token
    pub refresh_token_rotates: bool,
    /// Assumed lifetime when a token response has no `expires_in`
    #[serde(with = "humantime_serde")]
    pub default_expires_in: Duration,
}

fn default_true() -> bool {
    true
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token_endpoint: String::new(),
            client_id: String::new(),
            client_secret: None,
            redirect_uri: None,
            scopes: Vec::new(),
            refresh_token_rotates: false,
            default_expires_in: Duration::from_secs(3600),
        }
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s")
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    /// Deserialize human-readable duration string (e.g., "100ms", "30s", "5m", "1h", "90d")
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(s.trim()).map_err(serde::de::Error::custom)
    }

    pub(crate) fn parse(s: &str) -> Result<Duration, std::num::ParseIntError> {
        // "ms" before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>().map(Duration::from_millis)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>().map(Duration::from_secs)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.parse::<u64>().map(|m| Duration::from_secs(m * 60))
        } else if let Some(hours) = s.strip_suffix('h') {
            hours.parse::<u64>().map(|h| Duration::from_secs(h * 3600))
        } else if let Some(days) = s.strip_suffix('d') {
            days.parse::<u64>().map(|d| Duration::from_secs(d * 86_400))
        } else {
            // Assume seconds
            s.parse::<u64>().map(Duration::from_secs)
        }
    }
}
