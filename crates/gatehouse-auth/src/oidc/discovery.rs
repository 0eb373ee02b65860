//! Provider metadata discovery.
//!
//! The relying party talks to a single identity provider, so metadata is
//! fetched once and memoised for the lifetime of the process. The server
//! resolves it before binding its socket; a failure there is fatal.
//!
//! # Security Considerations
//!
//! - Only HTTPS URLs are allowed unless `allow_http` is set
//! - The `issuer` in the document must match the configured location
//! - Response size is bounded

use std::sync::Arc;

use tokio::sync::OnceCell;
use url::Url;

use super::metadata::ProviderMetadata;

/// Path suffix of the provider configuration document.
pub const WELL_KNOWN_PATH: &str = "/.well-known/openid-configuration";

/// Configuration for metadata discovery.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Maximum response size in bytes (default: 1 MB).
    pub max_response_size: usize,

    /// Whether to allow HTTP (non-HTTPS) URLs.
    pub allow_http: bool,

    /// Whether the document `issuer` must match the configured location.
    pub validate_issuer: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_response_size: 1024 * 1024,
            allow_http: false,
            validate_issuer: true,
        }
    }
}

impl DiscoveryConfig {
    /// Sets the maximum response size.
    #[must_use]
    pub fn with_max_response_size(mut self, size: usize) -> Self {
        self.max_response_size = size;
        self
    }

    /// Allows HTTP (non-HTTPS) provider URLs. Testing and local development only.
    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }

    /// Enables or disables the issuer check.
    #[must_use]
    pub fn with_issuer_validation(mut self, validate: bool) -> Self {
        self.validate_issuer = validate;
        self
    }
}

/// Errors that can occur during discovery.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// A network error occurred while fetching the document.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The HTTP request returned a non-success status code.
    #[error("HTTP error: status {0}")]
    HttpError(u16),

    /// The document could not be parsed as JSON.
    #[error("Failed to parse discovery document: {0}")]
    ParseError(String),

    /// The configured location could not be parsed.
    #[error("Invalid discovery URL: {0}")]
    InvalidUrl(String),

    /// The issuer in the document does not match the expected issuer.
    #[error("Issuer mismatch: expected {expected}, got {actual}")]
    IssuerMismatch { expected: String, actual: String },

    /// A required endpoint is missing or malformed.
    #[error("Invalid endpoint {field}: {reason}")]
    InvalidEndpoint { field: &'static str, reason: String },

    /// The URL scheme is not allowed.
    #[error("Invalid URL scheme: {0} (only HTTPS is allowed)")]
    InvalidScheme(String),

    /// The response exceeded the maximum allowed size.
    #[error("Response exceeds maximum size of {max_size} bytes")]
    ResponseTooLarge { max_size: usize },
}

/// Splits a configured location into the document URL and the issuer it
/// should assert.
///
/// Accepts either an issuer (`https://idp.example.com/tenant`) or the full
/// document URL (`https://idp.example.com/tenant/.well-known/openid-configuration`).
#[must_use]
pub fn resolve_location(location: &Url) -> (Url, String) {
    let path = location.path().trim_end_matches('/');

    if let Some(issuer_path) = path.strip_suffix(WELL_KNOWN_PATH) {
        let mut issuer = location.clone();
        issuer.set_path(issuer_path);
        issuer.set_query(None);
        let expected = issuer.as_str().trim_end_matches('/').to_string();
        return (location.clone(), expected);
    }

    let mut discovery_url = location.clone();
    discovery_url.set_path(&format!("{path}{WELL_KNOWN_PATH}"));
    let expected = location.as_str().trim_end_matches('/').to_string();
    (discovery_url, expected)
}

/// Fetches the provider configuration once and hands out the cached copy.
pub struct MetadataResolver {
    http_client: reqwest::Client,
    discovery_url: Url,
    expected_issuer: String,
    config: DiscoveryConfig,
    metadata: OnceCell<Arc<ProviderMetadata>>,
}

impl MetadataResolver {
    /// Creates a resolver for the given issuer or document URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the location is not a URL or uses a disallowed scheme.
    pub fn new(
        location: &str,
        http_client: reqwest::Client,
        config: DiscoveryConfig,
    ) -> Result<Self, DiscoveryError> {
        let url = Url::parse(location)
            .map_err(|e| DiscoveryError::InvalidUrl(format!("{location} - {e}")))?;
        validate_scheme(&url, config.allow_http)?;

        let (discovery_url, expected_issuer) = resolve_location(&url);

        Ok(Self {
            http_client,
            discovery_url,
            expected_issuer,
            config,
            metadata: OnceCell::new(),
        })
    }

    /// Returns the provider metadata, fetching it on first use.
    ///
    /// Concurrent first calls share one request. A failed fetch is not
    /// cached; the next call tries again.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be fetched, parsed or validated.
    pub async fn fetch_metadata(&self) -> Result<Arc<ProviderMetadata>, DiscoveryError> {
        self.metadata
            .get_or_try_init(|| self.discover())
            .await
            .map(Arc::clone)
    }

    /// The document URL this resolver fetches.
    #[must_use]
    pub fn discovery_url(&self) -> &Url {
        &self.discovery_url
    }

    async fn discover(&self) -> Result<Arc<ProviderMetadata>, DiscoveryError> {
        let response = self
            .http_client
            .get(self.discovery_url.as_str())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(url = %self.discovery_url, error = %e, "Failed to fetch provider metadata");
                DiscoveryError::NetworkError(e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(DiscoveryError::HttpError(response.status().as_u16()));
        }

        let max_size = self.config.max_response_size;
        if let Some(len) = response.content_length()
            && len as usize > max_size
        {
            return Err(DiscoveryError::ResponseTooLarge { max_size });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| DiscoveryError::NetworkError(e.to_string()))?;
        if body.len() > max_size {
            return Err(DiscoveryError::ResponseTooLarge { max_size });
        }

        let metadata: ProviderMetadata = serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!(url = %self.discovery_url, error = %e, "Failed to parse provider metadata");
            DiscoveryError::ParseError(e.to_string())
        })?;

        self.validate_issuer(&metadata)?;
        validate_endpoint("authorization_endpoint", &metadata.authorization_endpoint)?;
        validate_endpoint("token_endpoint", &metadata.token_endpoint)?;

        tracing::info!(
            issuer = %metadata.issuer,
            end_session = metadata.end_session_endpoint.is_some(),
            userinfo = metadata.userinfo_endpoint.is_some(),
            "Provider metadata discovered"
        );

        Ok(Arc::new(metadata))
    }

    fn validate_issuer(&self, metadata: &ProviderMetadata) -> Result<(), DiscoveryError> {
        if !self.config.validate_issuer {
            return Ok(());
        }

        let actual = metadata.issuer.trim_end_matches('/');
        if actual != self.expected_issuer {
            return Err(DiscoveryError::IssuerMismatch {
                expected: self.expected_issuer.clone(),
                actual: actual.to_string(),
            });
        }

        Ok(())
    }
}

fn validate_scheme(url: &Url, allow_http: bool) -> Result<(), DiscoveryError> {
    match url.scheme() {
        "https" => Ok(()),
        "http" if allow_http => Ok(()),
        other => Err(DiscoveryError::InvalidScheme(other.to_string())),
    }
}

fn validate_endpoint(field: &'static str, value: &str) -> Result<(), DiscoveryError> {
    if value.is_empty() {
        return Err(DiscoveryError::InvalidEndpoint {
            field,
            reason: "empty".to_string(),
        });
    }
    Url::parse(value).map_err(|e| DiscoveryError::InvalidEndpoint {
        field,
        reason: e.to_string(),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn document(issuer: &str) -> serde_json::Value {
        json!({
            "issuer": issuer,
            "authorization_endpoint": format!("{issuer}/authorize"),
            "token_endpoint": format!("{issuer}/token"),
            "userinfo_endpoint": format!("{issuer}/userinfo"),
            "end_session_endpoint": format!("{issuer}/logout"),
            "response_types_supported": ["code"],
            "code_challenge_methods_supported": ["S256"]
        })
    }

    fn test_config() -> DiscoveryConfig {
        DiscoveryConfig::default().with_allow_http(true)
    }

    #[test]
    fn test_resolve_location_from_issuer() {
        let url = Url::parse("https://idp.example.com/tenant/v2.0").unwrap();
        let (discovery, issuer) = resolve_location(&url);
        assert_eq!(
            discovery.as_str(),
            "https://idp.example.com/tenant/v2.0/.well-known/openid-configuration"
        );
        assert_eq!(issuer, "https://idp.example.com/tenant/v2.0");
    }

    #[test]
    fn test_resolve_location_from_document_url() {
        let url = Url::parse(
            "https://idp.example.com/tenant/v2.0/.well-known/openid-configuration?appid=1",
        )
        .unwrap();
        let (discovery, issuer) = resolve_location(&url);
        assert_eq!(discovery, url);
        assert_eq!(issuer, "https://idp.example.com/tenant/v2.0");
    }

    #[test]
    fn test_resolve_location_root_issuer() {
        let url = Url::parse("https://idp.example.com/").unwrap();
        let (discovery, issuer) = resolve_location(&url);
        assert_eq!(
            discovery.as_str(),
            "https://idp.example.com/.well-known/openid-configuration"
        );
        assert_eq!(issuer, "https://idp.example.com");
    }

    #[test]
    fn test_http_rejected_by_default() {
        let result = MetadataResolver::new(
            "http://idp.example.com",
            reqwest::Client::new(),
            DiscoveryConfig::default(),
        );
        assert!(matches!(result, Err(DiscoveryError::InvalidScheme(s)) if s == "http"));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let result = MetadataResolver::new(
            "not a url",
            reqwest::Client::new(),
            DiscoveryConfig::default(),
        );
        assert!(matches!(result, Err(DiscoveryError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_fetch_metadata_is_memoised() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(document(&server.uri())))
            .expect(1)
            .mount(&server)
            .await;

        let resolver =
            MetadataResolver::new(&server.uri(), reqwest::Client::new(), test_config()).unwrap();
        let first = resolver.fetch_metadata().await.unwrap();
        let second = resolver.fetch_metadata().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.token_endpoint, format!("{}/token", server.uri()));
    }

    #[tokio::test]
    async fn test_issuer_mismatch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(document("https://evil.example.com")),
            )
            .mount(&server)
            .await;

        let resolver =
            MetadataResolver::new(&server.uri(), reqwest::Client::new(), test_config()).unwrap();
        let err = resolver.fetch_metadata().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::IssuerMismatch { .. }));

        let lenient = MetadataResolver::new(
            &server.uri(),
            reqwest::Client::new(),
            test_config().with_issuer_validation(false),
        )
        .unwrap();
        assert!(lenient.fetch_metadata().await.is_ok());
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let resolver =
            MetadataResolver::new(&server.uri(), reqwest::Client::new(), test_config()).unwrap();
        let err = resolver.fetch_metadata().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::HttpError(503)));

        // Failures are not memoised
        assert!(resolver.fetch_metadata().await.is_err());
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_response_too_large() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(document(&server.uri())))
            .mount(&server)
            .await;

        let resolver = MetadataResolver::new(
            &server.uri(),
            reqwest::Client::new(),
            test_config().with_max_response_size(16),
        )
        .unwrap();
        let err = resolver.fetch_metadata().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::ResponseTooLarge { max_size: 16 }));
    }

    #[tokio::test]
    async fn test_malformed_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let resolver =
            MetadataResolver::new(&server.uri(), reqwest::Client::new(), test_config()).unwrap();
        let err = resolver.fetch_metadata().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::ParseError(_)));
    }

    #[test]
    fn test_error_display() {
        let err = DiscoveryError::IssuerMismatch {
            expected: "https://a".to_string(),
            actual: "https://b".to_string(),
        };
        assert_eq!(err.to_string(), "Issuer mismatch: expected https://a, got https://b");
        assert_eq!(
            DiscoveryError::InvalidScheme("ftp".into()).to_string(),
            "Invalid URL scheme: ftp (only HTTPS is allowed)"
        );
    }
}
