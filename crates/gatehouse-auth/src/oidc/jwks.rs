//! Provider JWKS fetching and caching.
//!
//! ID tokens are signed with keys the provider publishes at `jwks_uri`.
//! [`JwksCache`] fetches that set, keeps it for the `Cache-Control: max-age`
//! the provider sends (clamped between a minimum and maximum TTL) and
//! refetches on a `kid` miss so key rotation is picked up without a restart.
//!
//! # Security Considerations
//!
//! - Only HTTPS URIs are allowed unless `allow_http` is set
//! - Response size is bounded
//! - Keys marked `use: enc` are never used for signature checks

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{Jwk, JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::RwLock;
use url::Url;

/// Configuration for the JWKS cache.
#[derive(Debug, Clone)]
pub struct JwksCacheConfig {
    /// TTL when the response carries no `max-age` (default: 1 hour).
    pub default_ttl: Duration,

    /// Upper bound on any TTL (default: 24 hours).
    pub max_ttl: Duration,

    /// Lower bound on any TTL (default: 5 minutes).
    pub min_ttl: Duration,

    /// Maximum response size in bytes (default: 1 MB).
    pub max_response_size: usize,

    /// Whether to allow HTTP (non-HTTPS) JWKS URIs.
    pub allow_http: bool,
}

impl Default for JwksCacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
            max_ttl: Duration::from_secs(86400),
            min_ttl: Duration::from_secs(300),
            max_response_size: 1024 * 1024,
            allow_http: false,
        }
    }
}

impl JwksCacheConfig {
    /// Sets the maximum response size.
    #[must_use]
    pub fn with_max_response_size(mut self, size: usize) -> Self {
        self.max_response_size = size;
        self
    }

    /// Allows HTTP (non-HTTPS) JWKS URIs. Testing and local development only.
    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }
}

/// Errors that can occur while obtaining signing keys.
#[derive(Debug, thiserror::Error)]
pub enum JwksError {
    /// A network error occurred while fetching the JWKS.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The HTTP request returned a non-success status code.
    #[error("HTTP error: status {0}")]
    HttpError(u16),

    /// The JWKS response could not be parsed.
    #[error("Failed to parse JWKS: {0}")]
    ParseError(String),

    /// No key with the requested `kid` is published.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// The set holds no usable signing keys.
    #[error("No signing keys found in JWKS")]
    NoSigningKeys,

    /// The JWKS URI scheme is not allowed.
    #[error("Invalid URL scheme: {0} (only HTTPS is allowed)")]
    InvalidScheme(String),

    /// The response exceeded the maximum allowed size.
    #[error("Response exceeds maximum size of {max_size} bytes")]
    ResponseTooLarge { max_size: usize },
}

struct CachedJwks {
    jwks: JwkSet,
    expires_at: Instant,
}

/// In-memory cache of provider key sets, keyed by JWKS URI.
#[derive(Clone)]
pub struct JwksCache {
    http_client: reqwest::Client,
    cache: Arc<RwLock<HashMap<String, CachedJwks>>>,
    config: JwksCacheConfig,
}

impl std::fmt::Debug for JwksCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksCache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl JwksCache {
    /// Create a cache that fetches with `http_client`.
    #[must_use]
    pub fn new(http_client: reqwest::Client, config: JwksCacheConfig) -> Self {
        Self {
            http_client,
            cache: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Decoding key for `kid`, refetching the set once on a miss.
    ///
    /// Returns the key and the algorithm the JWK declares, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the set cannot be fetched or holds no such key.
    pub async fn get_key(
        &self,
        jwks_uri: &Url,
        kid: &str,
    ) -> Result<(DecodingKey, Option<Algorithm>), JwksError> {
        if let Some(found) = self.cached_key(jwks_uri, kid).await {
            tracing::trace!(kid, uri = %jwks_uri, "JWKS cache hit");
            return Ok(found);
        }

        tracing::debug!(kid, uri = %jwks_uri, "JWKS cache miss");
        self.refresh(jwks_uri).await?;

        self.cached_key(jwks_uri, kid)
            .await
            .ok_or_else(|| JwksError::KeyNotFound(kid.to_string()))
    }

    async fn cached_key(
        &self,
        jwks_uri: &Url,
        kid: &str,
    ) -> Option<(DecodingKey, Option<Algorithm>)> {
        let cache = self.cache.read().await;
        let cached = cache.get(&normalize_uri(jwks_uri))?;
        if Instant::now() >= cached.expires_at {
            return None;
        }

        cached
            .jwks
            .keys
            .iter()
            .filter(|k| is_signing_key(k))
            .find(|k| k.common.key_id.as_deref() == Some(kid))
            .and_then(|jwk| {
                DecodingKey::from_jwk(jwk)
                    .ok()
                    .map(|key| (key, jwk_algorithm(jwk)))
            })
    }

    /// Every signing key in the set, for tokens without a `kid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the set cannot be fetched or holds no signing keys.
    pub async fn signing_keys(
        &self,
        jwks_uri: &Url,
    ) -> Result<Vec<(DecodingKey, Option<Algorithm>)>, JwksError> {
        self.ensure_cached(jwks_uri).await?;

        let cache = self.cache.read().await;
        let keys: Vec<_> = cache
            .get(&normalize_uri(jwks_uri))
            .map(|cached| {
                cached
                    .jwks
                    .keys
                    .iter()
                    .filter(|k| is_signing_key(k))
                    .filter_map(|jwk| {
                        DecodingKey::from_jwk(jwk)
                            .ok()
                            .map(|key| (key, jwk_algorithm(jwk)))
                    })
                    .collect()
            })
            .unwrap_or_default();

        if keys.is_empty() {
            return Err(JwksError::NoSigningKeys);
        }
        Ok(keys)
    }

    async fn ensure_cached(&self, jwks_uri: &Url) -> Result<(), JwksError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(&normalize_uri(jwks_uri))
                && Instant::now() < cached.expires_at
            {
                return Ok(());
            }
        }

        self.refresh(jwks_uri).await
    }

    /// Fetch the set from `jwks_uri` and replace the cached entry.
    ///
    /// # Errors
    ///
    /// Returns an error for a disallowed scheme, a transport failure, a
    /// non-success status, an oversized body or an unparsable set.
    pub async fn refresh(&self, jwks_uri: &Url) -> Result<(), JwksError> {
        validate_scheme(jwks_uri, self.config.allow_http)?;

        let response = self
            .http_client
            .get(jwks_uri.as_str())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(uri = %jwks_uri, error = %e, "Failed to fetch JWKS");
                JwksError::NetworkError(e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(JwksError::HttpError(response.status().as_u16()));
        }

        let max_size = self.config.max_response_size;
        if let Some(len) = response.content_length()
            && len as usize > max_size
        {
            return Err(JwksError::ResponseTooLarge { max_size });
        }

        let ttl = self.parse_cache_control(response.headers());

        let body = response
            .bytes()
            .await
            .map_err(|e| JwksError::NetworkError(e.to_string()))?;
        if body.len() > max_size {
            return Err(JwksError::ResponseTooLarge { max_size });
        }

        let jwks: JwkSet = serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!(uri = %jwks_uri, error = %e, "Failed to parse JWKS");
            JwksError::ParseError(e.to_string())
        })?;

        tracing::debug!(uri = %jwks_uri, keys = jwks.keys.len(), ?ttl, "Cached JWKS");

        self.cache.write().await.insert(
            normalize_uri(jwks_uri),
            CachedJwks {
                jwks,
                expires_at: Instant::now() + ttl,
            },
        );

        Ok(())
    }

    /// TTL from `max-age`, clamped to the configured bounds.
    fn parse_cache_control(&self, headers: &reqwest::header::HeaderMap) -> Duration {
        let ttl = headers
            .get(reqwest::header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| {
                v.split(',').find_map(|directive| {
                    directive
                        .trim()
                        .strip_prefix("max-age=")
                        .and_then(|secs| secs.parse::<u64>().ok())
                })
            })
            .map_or(self.config.default_ttl, Duration::from_secs);

        ttl.min(self.config.max_ttl).max(self.config.min_ttl)
    }
}

fn validate_scheme(uri: &Url, allow_http: bool) -> Result<(), JwksError> {
    match uri.scheme() {
        "https" => Ok(()),
        "http" if allow_http => Ok(()),
        other => Err(JwksError::InvalidScheme(other.to_string())),
    }
}

fn normalize_uri(uri: &Url) -> String {
    uri.as_str().trim_end_matches('/').to_string()
}

fn is_signing_key(jwk: &Jwk) -> bool {
    !matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption))
}

fn jwk_algorithm(jwk: &Jwk) -> Option<Algorithm> {
    jwk.common.key_algorithm.as_ref().and_then(|alg| match alg {
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    })
}
