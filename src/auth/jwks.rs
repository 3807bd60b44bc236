//! Retrieval and caching of the signing keys of a user pool.
//!
//! Keys are kept for five minutes. An unknown key id triggers a refetch to pick up rotated keys,
//! but never more than once every ten seconds.

use anyhow::{Context, bail};
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use jwks::Jwks;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
use mock_instant::thread_local::SystemTime;
#[cfg(not(test))]
use std::time::SystemTime;

/// Maps key ids (`kid`) to their decoding keys.
pub(crate) type KeySet = HashMap<String, Arc<DecodingKey>>;

const MAX_KEY_AGE: Duration = Duration::from_secs(5 * 60);
const MIN_REFETCH_INTERVAL: Duration = Duration::from_secs(10);

/// Returns the well-known JWKS location of a Cognito user pool.
pub(crate) fn user_pool_jwks_url(region: &str, user_pool_id: &str) -> String {
    format!(
        "https://cognito-idp.{}.amazonaws.com/{}/.well-known/jwks.json",
        region, user_pool_id
    )
}

#[async_trait]
pub(crate) trait JwksFetcher: Send + Sync {
    async fn fetch(&self) -> anyhow::Result<KeySet>;
}

/// Downloads the key set from a JWKS endpoint.
pub(crate) struct UrlJwksFetcher {
    client: Client,
    url: String,
}

impl UrlJwksFetcher {
    pub(crate) fn new(url: String) -> Self {
        UrlJwksFetcher {
            client: Client::default(),
            url,
        }
    }
}

#[async_trait]
impl JwksFetcher for UrlJwksFetcher {
    async fn fetch(&self) -> anyhow::Result<KeySet> {
        let jwks = Jwks::from_jwks_url_with_client(&self.client, &self.url)
            .await
            .with_context(|| format!("Failed to fetch JWKS from: {}", self.url))?;

        Ok(jwks
            .keys
            .into_iter()
            .map(|(kid, key)| (kid, Arc::new(key.decoding_key)))
            .collect())
    }
}

struct CachedKeys {
    keys: KeySet,
    fetched_at: SystemTime,
}

pub(crate) struct JwksCache {
    fetcher: Box<dyn JwksFetcher>,
    cached: ArcSwapOption<CachedKeys>,
    last_attempt: ArcSwapOption<SystemTime>,
}

impl JwksCache {
    pub(crate) fn new(fetcher: Box<dyn JwksFetcher>) -> Self {
        JwksCache {
            fetcher,
            cached: ArcSwapOption::empty(),
            last_attempt: ArcSwapOption::empty(),
        }
    }

    /// Returns the decoding key with the given id.
    pub(crate) async fn key(&self, key_id: &str) -> anyhow::Result<Arc<DecodingKey>> {
        if let Some(cached) = self.cached.load_full()
            && age(&cached.fetched_at) <= MAX_KEY_AGE
            && let Some(key) = cached.keys.get(key_id)
        {
            return Ok(key.clone());
        }

        if !self.may_refetch() {
            return self.stale_key(key_id);
        }

        self.last_attempt.store(Some(Arc::new(SystemTime::now())));
        let keys = self.fetcher.fetch().await.inspect_err(|err| {
            tracing::warn!("Failed to refresh signing keys: {:#}", err);
            self.cached.store(None);
        })?;
        tracing::debug!("Fetched {} signing key(s)", keys.len());

        let key = keys.get(key_id).cloned();
        self.cached.store(Some(Arc::new(CachedKeys {
            keys,
            fetched_at: SystemTime::now(),
        })));

        match key {
            Some(key) => Ok(key),
            None => bail!("Unknown JWKS key: {}", key_id),
        }
    }

    fn may_refetch(&self) -> bool {
        self.last_attempt
            .load_full()
            .is_none_or(|last_attempt| age(&last_attempt) > MIN_REFETCH_INTERVAL)
    }

    /// Serves a key from the current cache while a refetch is not permitted yet.
    fn stale_key(&self, key_id: &str) -> anyhow::Result<Arc<DecodingKey>> {
        match self.cached.load_full() {
            Some(cached) => cached
                .keys
                .get(key_id)
                .cloned()
                .with_context(|| format!("Unknown JWKS key: {}", key_id)),
            None => bail!("JWKS not loaded or empty"),
        }
    }
}

fn age(timestamp: &SystemTime) -> Duration {
    SystemTime::now()
        .duration_since(*timestamp)
        .unwrap_or_default()
}
