//! OAuth Bridge Library
//!
//! A single OAuth 2.0 authorization server that fronts several upstream
//! identity providers. A client completes one PKCE authorization; behind it
//! the user connects each upstream provider, and the client receives one
//! bridge access token embedding every provider's credentials.
//!
//! # Features
//!
//! - **Discovery**: RFC 8414 / RFC 9728 metadata, RFC 7591 registration
//! - **Two PKCE flows**: relay of a client challenge, or server-held verifier
//! - **Single-use codes**: TTL store with atomic consumption and a background sweeper
//! - **Refresh fan-out**: all providers refreshed concurrently, all-or-nothing
//! - **Rotation aware**: static refresh tokens are carried forward

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bridge;
pub mod cli;
pub mod config;
pub mod error;
pub mod oauth;
pub mod provider;
pub mod store;
pub mod token;

pub use error::{Error, Result};

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Current Unix time in seconds.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
