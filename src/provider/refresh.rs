//! Multi-provider refresh fan-out and merge.
//!
//! All targeted providers are refreshed concurrently and every call is awaited
//! before anything is decided. One failure fails the whole refresh: callers
//! never get a mix of refreshed and stale provider credentials.

use std::collections::BTreeMap;

use futures::future::join_all;
use tracing::{debug, warn};

use super::{ProviderError, ProviderKey, ProviderRecords, ProviderRegistry, ProviderTokenRecord};

/// Why a multi-provider refresh produced no tokens.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    /// The refresh token embeds no usable provider refresh credential.
    #[error("no provider refresh tokens present")]
    NothingToRefresh,

    /// At least one provider refresh failed.
    #[error("refresh failed for {provider}: {source}")]
    ProviderFailed {
        /// First provider (in key order) that failed
        provider: ProviderKey,
        /// Classified failure
        source: ProviderError,
    },
}

/// Result of a successful fan-out.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    /// Merged records for every refreshed provider
    pub records: ProviderRecords,
    /// Providers whose refresh tokens rotate
    pub rotating: Vec<ProviderKey>,
}

/// Refresh every provider that has a non-empty refresh token.
///
/// Providers absent from `refresh_tokens` are skipped.
pub async fn refresh_all(
    registry: &ProviderRegistry,
    refresh_tokens: &BTreeMap<ProviderKey, String>,
) -> Result<RefreshOutcome, RefreshError> {
    let targets: Vec<(ProviderKey, &str)> = refresh_tokens
        .iter()
        .filter(|(_, token)| !token.is_empty())
        .map(|(key, token)| (*key, token.as_str()))
        .collect();

    if targets.is_empty() {
        return Err(RefreshError::NothingToRefresh);
    }

    let mut adapters = Vec::with_capacity(targets.len());
    for (key, token) in &targets {
        let adapter = registry
            .get(*key)
            .ok_or_else(|| RefreshError::ProviderFailed {
                provider: *key,
                source: ProviderError::Unknown(key.to_string()),
            })?;
        adapters.push((*key, *token, adapter));
    }

    let calls = adapters.iter().map(|(key, token, adapter)| async move {
        debug!(provider = %key, "Refreshing provider credentials");
        (*key, adapter.refresh_access_token(token).await)
    });
    let results = join_all(calls).await;

    let mut fresh = BTreeMap::new();
    let mut first_failure = None;
    for (key, result) in results {
        match result {
            Ok(record) => {
                fresh.insert(key, record);
            }
            Err(e) => {
                warn!(
                    provider = %key,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Provider refresh failed"
                );
                first_failure.get_or_insert((key, e));
            }
        }
    }
    if let Some((provider, source)) = first_failure {
        return Err(RefreshError::ProviderFailed { provider, source });
    }

    let mut records = ProviderRecords::new();
    let mut rotating = Vec::new();
    for (key, token, adapter) in &adapters {
        let rotates = adapter.refresh_token_rotates();
        if rotates {
            rotating.push(*key);
        }
        if let Some(record) = fresh.remove(key) {
            records.insert(*key, merge_refreshed(token, record, rotates));
        }
    }

    Ok(RefreshOutcome { records, rotating })
}

/// Merge a fresh provider response with the refresh token it was obtained with.
///
/// A static (non-rotating) provider may omit the refresh token; the previous
/// one stays valid and is carried forward unchanged.
#[must_use]
pub fn merge_refreshed(
    previous_refresh_token: &str,
    mut fresh: ProviderTokenRecord,
    rotates: bool,
) -> ProviderTokenRecord {
    if fresh.refresh_token().is_none() {
        if rotates {
            warn!("Rotating provider returned no refresh token");
            fresh.refresh_token = None;
        } else {
            fresh.refresh_token = Some(previous_refresh_token.to_string());
        }
    }
    fresh
}
