//! JWKS (JSON Web Key Set) fetching and caching
//!
//! Verification keys published by an authorization server, fetched over
//! HTTPS and cached with a TTL so repeated verifications do not hammer the
//! server:
//!
//! - **TTL-based caching**: default 10 minutes
//! - **Rate-limited refresh**: forced refreshes are throttled
//! - **HTTPS required**: plain HTTP only for loopback hosts
//!
//! The cache is written once per fetch and read-only in between; callers
//! never observe a partially updated key set.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::errors::{JoseError, Result};

/// A single JSON Web Key, carrying only the parameters verification needs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type (`RSA` or `EC`)
    pub kty: String,

    /// Key id, matched against the JWT `kid` header
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Intended algorithm
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// Intended use (`sig` or `enc`)
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub public_key_use: Option<String>,

    /// RSA modulus, Base64URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA public exponent, Base64URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    /// EC curve name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC x coordinate, Base64URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC y coordinate, Base64URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

/// A JSON Web Key Set as served from a `jwks_uri`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JwkSet {
    /// The published keys
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    /// Find a key by id
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|key| key.kid.as_deref() == Some(kid))
    }
}

/// JWKS cache entry with metadata
#[derive(Debug, Clone)]
struct CachedKeys {
    keys: JwkSet,
    cached_at: SystemTime,
    ttl: Duration,
}

impl CachedKeys {
    fn is_valid(&self) -> bool {
        match SystemTime::now().duration_since(self.cached_at) {
            Ok(age) => age < self.ttl,
            Err(_) => false, // clock went backwards, invalidate
        }
    }
}

/// Client for fetching and caching a single endpoint's JWKS
#[derive(Debug, Clone)]
pub struct JwksClient {
    jwks_uri: String,
    cache: Arc<RwLock<Option<CachedKeys>>>,
    http_client: reqwest::Client,
    cache_ttl: Duration,
    min_refresh_interval: Duration,
    last_refresh: Arc<RwLock<Option<SystemTime>>>,
}

impl JwksClient {
    /// Create a client with the default 10 minute cache TTL
    pub fn new(jwks_uri: impl Into<String>) -> Self {
        Self {
            jwks_uri: jwks_uri.into(),
            cache: Arc::new(RwLock::new(None)),
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
            cache_ttl: Duration::from_secs(600),
            min_refresh_interval: Duration::from_secs(5),
            last_refresh: Arc::new(RwLock::new(None)),
        }
    }

    /// Create a client with a custom cache TTL
    ///
    /// Shorter TTL detects key rotation faster; longer TTL spares the
    /// server. 5-30 minutes is the usual range.
    pub fn with_ttl(jwks_uri: impl Into<String>, cache_ttl: Duration) -> Self {
        let mut client = Self::new(jwks_uri);
        client.cache_ttl = cache_ttl;
        client
    }

    /// Get the key set, from cache when still valid
    ///
    /// # Errors
    /// [`JoseError::Http`] on transport failure,
    /// [`JoseError::KeyResolution`] on a non-success status or a rejected
    /// endpoint scheme.
    pub async fn get_keys(&self) -> Result<JwkSet> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref()
                && cached.is_valid()
            {
                debug!(jwks_uri = %self.jwks_uri, "Using cached JWKS");
                return Ok(cached.keys.clone());
            }
        }

        self.fetch_and_cache().await
    }

    /// Force a refresh, ignoring the cache
    ///
    /// Use when verification fails: the key may have been rotated. Refresh
    /// attempts are rate limited; a throttled call falls back to the cache.
    ///
    /// # Errors
    /// Same as [`JwksClient::get_keys`].
    pub async fn refresh(&self) -> Result<JwkSet> {
        {
            let last_refresh = self.last_refresh.read().await;
            if let Some(last) = *last_refresh
                && let Ok(since_last) = SystemTime::now().duration_since(last)
                && since_last < self.min_refresh_interval
            {
                warn!(
                    jwks_uri = %self.jwks_uri,
                    since_last_ms = since_last.as_millis(),
                    "JWKS refresh rate limited, using cache"
                );
                return self.get_keys().await;
            }
        }

        self.fetch_and_cache().await
    }

    async fn fetch_and_cache(&self) -> Result<JwkSet> {
        if !endpoint_scheme_allowed(&self.jwks_uri) {
            return Err(JoseError::key_resolution(
                "JWKS endpoint must use HTTPS (HTTP only allowed for loopback hosts)",
            ));
        }

        info!(jwks_uri = %self.jwks_uri, "Fetching JWKS from endpoint");

        let response = self.http_client.get(&self.jwks_uri).send().await?;
        if !response.status().is_success() {
            return Err(JoseError::key_resolution(format!(
                "JWKS endpoint returned status {}",
                response.status()
            )));
        }

        let keys: JwkSet = response.json().await?;

        info!(
            jwks_uri = %self.jwks_uri,
            key_count = keys.keys.len(),
            "Successfully fetched JWKS"
        );

        {
            let mut cache = self.cache.write().await;
            *cache = Some(CachedKeys {
                keys: keys.clone(),
                cached_at: SystemTime::now(),
                ttl: self.cache_ttl,
            });
        }
        {
            let mut last_refresh = self.last_refresh.write().await;
            *last_refresh = Some(SystemTime::now());
        }

        Ok(keys)
    }

    /// The JWKS endpoint URI
    #[must_use]
    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }

    /// Drop any cached keys
    pub async fn clear_cache(&self) {
        let mut cache = self.cache.write().await;
        *cache = None;
        debug!(jwks_uri = %self.jwks_uri, "JWKS cache cleared");
    }
}

/// HTTPS everywhere, plain HTTP only toward loopback hosts
fn endpoint_scheme_allowed(uri: &str) -> bool {
    uri.starts_with("https://")
        || uri.starts_with("http://localhost")
        || uri.starts_with("http://127.0.0.1")
        || uri.starts_with("http://[::1]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_matches_kid() {
        let set = JwkSet {
            keys: vec![
                Jwk { kty: "RSA".into(), kid: Some("a".into()), ..Jwk::default() },
                Jwk { kty: "EC".into(), kid: Some("b".into()), ..Jwk::default() },
            ],
        };
        assert_eq!(set.find("b").unwrap().kty, "EC");
        assert!(set.find("c").is_none());
    }

    #[test]
    fn cached_keys_validity() {
        let cached = CachedKeys {
            keys: JwkSet::default(),
            cached_at: SystemTime::now(),
            ttl: Duration::from_secs(600),
        };
        assert!(cached.is_valid());

        let expired = CachedKeys {
            keys: JwkSet::default(),
            cached_at: SystemTime::now() - Duration::from_secs(700),
            ttl: Duration::from_secs(600),
        };
        assert!(!expired.is_valid());
    }

    #[test]
    fn scheme_check_allows_loopback_http_only() {
        assert!(endpoint_scheme_allowed("https://as.example.com/jwks"));
        assert!(endpoint_scheme_allowed("http://localhost:8080/jwks"));
        assert!(endpoint_scheme_allowed("http://127.0.0.1:9999/jwks"));
        assert!(!endpoint_scheme_allowed("http://as.example.com/jwks"));
    }

    #[test]
    fn client_defaults() {
        let client = JwksClient::new("https://as.example.com/jwks");
        assert_eq!(client.jwks_uri(), "https://as.example.com/jwks");
        assert_eq!(client.cache_ttl, Duration::from_secs(600));
    }

    #[tokio::test]
    async fn clear_cache_empties_the_cache() {
        let client = JwksClient::new("https://as.example.com/jwks");
        client.clear_cache().await;
        assert!(client.cache.read().await.is_none());
    }
}
