//! JWKS (JSON Web Key Set) fetching and caching
//!
//! Key sets are cached per platform base URL for one hour. Within that window
//! a cached set is trusted without a network call; compromised keys are
//! revoked out-of-band, so serving a slightly stale set is acceptable.
//! Past the TTL the set must be refetched before it is used again, and a
//! failed refetch fails the request.
//!
//! Refreshes for the same URL are allowed to race. Both fetches complete and
//! the last write wins, which is harmless because key sets are idempotent and
//! rotate rarely.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info};

use crate::error::{AuthError, AuthResult};

/// Well-known path of the platform key set, relative to the base URL
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// How long a fetched key set is trusted
pub const JWKS_TTL: Duration = Duration::from_secs(3600);

/// Network timeout for a single key set fetch
pub const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// JSON Web Key
///
/// Only EC P-256 keys are usable for runtime tokens, but other key types are
/// parsed so a mixed key set does not fail as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type (`EC`, `RSA`, ...)
    pub kty: String,

    /// Key id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Intended use (`sig`, `enc`)
    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,

    /// Algorithm the key is meant for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// Curve name for EC keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC X coordinate (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC Y coordinate (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

/// JSON Web Key Set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    /// Published keys
    pub keys: Vec<Jwk>,
}

#[derive(Debug, Clone)]
struct CachedJwks {
    jwks: Arc<JwkSet>,
    fetched_at: SystemTime,
}

impl CachedJwks {
    fn is_fresh(&self, ttl: Duration) -> bool {
        match SystemTime::now().duration_since(self.fetched_at) {
            Ok(age) => age < ttl,
            Err(_) => false, // Clock went backwards, invalidate
        }
    }
}

/// Key set cache shared by every in-flight request
///
/// Construct one per process (the SDK does this at startup) and share it
/// behind an `Arc`.
///
/// # Example
///
/// ```rust,no_run
/// # use kiket_auth::JwksCache;
/// # tokio_test::block_on(async {
/// let cache = JwksCache::new();
/// let jwks = cache.fetch("https://kiket.dev").await?;
/// println!("{} keys", jwks.keys.len());
/// # Ok::<(), kiket_auth::AuthError>(())
/// # });
/// ```
#[derive(Debug)]
pub struct JwksCache {
    entries: DashMap<String, CachedJwks>,
    http_client: reqwest::Client,
    ttl: Duration,
    fetch_timeout: Duration,
}

impl Default for JwksCache {
    fn default() -> Self {
        Self::new()
    }
}

impl JwksCache {
    /// Create an empty cache with the standard one hour TTL
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Create an empty cache that fetches through `http_client`
    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self {
            entries: DashMap::new(),
            http_client,
            ttl: JWKS_TTL,
            fetch_timeout: JWKS_FETCH_TIMEOUT,
        }
    }

    /// Override the TTL (tests and forced-rotation tooling)
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Override the per-fetch network timeout
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Get the key set for `base_url`, fetching it if missing or expired
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::JwksFetch`] if the endpoint is unreachable, times
    /// out (10 seconds unless overridden), answers with a non-2xx status, or returns something
    /// that is not a key set. A failed fetch leaves any existing entry in place.
    pub async fn fetch(&self, base_url: &str) -> AuthResult<Arc<JwkSet>> {
        let key = normalize_base_url(base_url);

        if let Some(cached) = self.entries.get(key)
            && cached.is_fresh(self.ttl)
        {
            debug!(base_url = key, "Using cached JWKS");
            return Ok(Arc::clone(&cached.jwks));
        }

        let jwks = Arc::new(self.fetch_remote(key).await?);

        self.entries.insert(
            key.to_string(),
            CachedJwks {
                jwks: Arc::clone(&jwks),
                fetched_at: SystemTime::now(),
            },
        );

        Ok(jwks)
    }

    /// Drop every cached key set
    pub fn clear(&self) {
        self.entries.clear();
        debug!("JWKS cache cleared");
    }

    /// Number of base URLs currently cached (fresh or not)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    async fn fetch_remote(&self, base_url: &str) -> AuthResult<JwkSet> {
        let url = format!("{base_url}{JWKS_PATH}");
        info!(jwks_uri = %url, "Fetching JWKS from endpoint");

        let response = self
            .http_client
            .get(&url)
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(|e| {
                error!(jwks_uri = %url, error = %e, "Failed to fetch JWKS");
                AuthError::JwksFetch(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(jwks_uri = %url, status = %status, "JWKS endpoint returned error status");
            return Err(AuthError::JwksFetch(format!("JWKS endpoint returned status {status}")));
        }

        let jwks: JwkSet = response.json().await.map_err(|e| {
            error!(jwks_uri = %url, error = %e, "Failed to parse JWKS JSON");
            AuthError::JwksFetch(format!("Invalid JWKS format: {e}"))
        })?;

        info!(jwks_uri = %url, key_count = jwks.keys.len(), "Successfully fetched JWKS");
        Ok(jwks)
    }
}

fn normalize_base_url(base_url: &str) -> &str {
    base_url.trim_end_matches('/')
}
