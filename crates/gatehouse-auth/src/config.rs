//! Relying-party configuration.
//!
//! # Example (TOML)
//!
//! ```toml
//! [auth]
//! flow = "authorization_code"
//!
//! [auth.oidc]
//! discovery_url = "https://login.example.com/tenant/v2.0/.well-known/openid-configuration"
//! client_id = "my-app"
//! client_secret = "..."
//! redirect_uri = "http://localhost:3000/login/callback"
//! request_timeout = "10s"
//!
//! [auth.cookie]
//! secret = "..."
//!
//! # client_credentials flow only
//! [auth.client_credentials.resource]
//! url = "https://api.example.com/bookings/check"
//! method = "POST"
//! body = { datetime = "2026-03-01T12:00:00Z" }
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AuthError;
use crate::oidc::resource::ResourceRequest;

/// Which OAuth flow the process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFlow {
    /// Interactive browser login (Authorization Code + PKCE).
    #[default]
    AuthorizationCode,
    /// Machine-to-machine token acquisition.
    ClientCredentials,
}

impl AuthFlow {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::ClientCredentials => "client_credentials",
        }
    }
}

impl std::fmt::Display for AuthFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the provider returns the authorization response.
///
/// `Fragment` puts `code` and `state` after `#`, which browsers never send to
/// the server. The callback route answers a parameterless `GET` with a relay
/// page that posts the fragment back to the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    #[default]
    Query,
    Fragment,
    FormPost,
}

impl ResponseMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Fragment => "fragment",
            Self::FormPost => "form_post",
        }
    }
}

/// Client authentication at the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
    /// HTTP Basic with the client id and secret.
    ClientSecretBasic,
    /// `client_id` and `client_secret` in the form body.
    ClientSecretPost,
}

impl ClientAuthMethod {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientSecretBasic => "client_secret_basic",
            Self::ClientSecretPost => "client_secret_post",
        }
    }
}

/// SameSite attribute for the cookies the relying party sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SameSitePolicy {
    Strict,
    #[default]
    Lax,
    None,
}

impl SameSitePolicy {
    #[must_use]
    pub fn to_cookie(self) -> cookie::SameSite {
        match self {
            Self::Strict => cookie::SameSite::Strict,
            Self::Lax => cookie::SameSite::Lax,
            Self::None => cookie::SameSite::None,
        }
    }
}

/// Root relying-party configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RelyingPartyConfig {
    /// Flow the process runs.
    pub flow: AuthFlow,

    /// Identity provider and client registration.
    pub oidc: OidcClientConfig,

    /// Signed cookie settings.
    pub cookie: CookieConfig,

    /// Server-side session lifetime.
    pub session: SessionConfig,

    /// Client credentials flow options.
    pub client_credentials: ClientCredentialsConfig,
}

impl RelyingPartyConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` naming the first offending field.
    pub fn validate(&self) -> Result<(), AuthError> {
        let oidc = &self.oidc;
        if oidc.discovery_url.trim().is_empty() {
            return Err(AuthError::configuration(
                "oidc.discovery_url is required",
            ));
        }
        Url::parse(&oidc.discovery_url).map_err(|e| {
            AuthError::configuration(format!("oidc.discovery_url is not a valid URL: {e}"))
        })?;
        if oidc.client_id.trim().is_empty() {
            return Err(AuthError::configuration("oidc.client_id is required"));
        }
        if oidc.client_secret.is_empty() {
            return Err(AuthError::configuration("oidc.client_secret is required"));
        }
        if oidc.request_timeout.is_zero() {
            return Err(AuthError::configuration(
                "oidc.request_timeout must be > 0",
            ));
        }

        if let Some(resource) = &self.client_credentials.resource {
            Url::parse(&resource.url).map_err(|e| {
                AuthError::configuration(format!(
                    "client_credentials.resource.url is not a valid URL: {e}"
                ))
            })?;
        }

        if self.flow == AuthFlow::AuthorizationCode {
            if self.cookie.secret.is_empty() {
                return Err(AuthError::configuration("cookie.secret is required"));
            }
            Url::parse(&oidc.redirect_uri).map_err(|e| {
                AuthError::configuration(format!("oidc.redirect_uri is not a valid URL: {e}"))
            })?;
            Url::parse(&oidc.post_logout_redirect_uri).map_err(|e| {
                AuthError::configuration(format!(
                    "oidc.post_logout_redirect_uri is not a valid URL: {e}"
                ))
            })?;
            if !oidc.scopes.iter().any(|s| s == "openid") {
                return Err(AuthError::configuration(
                    "oidc.scopes must include 'openid'",
                ));
            }
            if self.cookie.token_cookie_name == self.cookie.session_cookie_name {
                return Err(AuthError::configuration(
                    "cookie.token_cookie_name and cookie.session_cookie_name must differ",
                ));
            }
            if !oidc.post_login_path.starts_with('/') || oidc.post_login_path.starts_with("//") {
                return Err(AuthError::configuration(
                    "oidc.post_login_path must be a local absolute path",
                ));
            }
            // The provider posts cross-site; Lax/Strict cookies would not be sent
            if oidc.response_mode == ResponseMode::FormPost
                && (self.cookie.same_site != SameSitePolicy::None || !self.cookie.secure)
            {
                return Err(AuthError::configuration(
                    "oidc.response_mode = form_post requires cookie.same_site = none and cookie.secure = true",
                ));
            }
            if self.session.idle_timeout.is_zero() || self.session.purge_interval.is_zero() {
                return Err(AuthError::configuration(
                    "session.idle_timeout and session.purge_interval must be > 0",
                ));
            }
        }

        Ok(())
    }
}

/// Identity provider and client registration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OidcClientConfig {
    /// Issuer URL or the full `.well-known/openid-configuration` URL.
    pub discovery_url: String,

    /// Registered client id.
    pub client_id: String,

    /// Registered client secret.
    pub client_secret: String,

    /// Callback URL registered with the provider.
    pub redirect_uri: String,

    /// Where the provider sends the browser after logout.
    pub post_logout_redirect_uri: String,

    /// Local path the browser lands on after a successful login.
    pub post_login_path: String,

    /// Requested scopes. Must contain `openid`.
    pub scopes: Vec<String>,

    /// Authorization response mode.
    pub response_mode: ResponseMode,

    /// Send a `nonce` and verify it in the ID token.
    pub use_nonce: bool,

    /// Client authentication for the code exchange.
    pub token_auth_method: ClientAuthMethod,

    /// Timeout applied to every call to the provider.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Leeway when checking ID token `exp`.
    #[serde(with = "humantime_serde")]
    pub clock_skew_leeway: Duration,

    /// Allow `http://` provider URLs. Development only.
    pub allow_http: bool,

    /// Require the discovered `issuer` to match the discovery URL.
    /// Multi-tenant endpoints advertise a templated issuer and need this off.
    pub validate_issuer: bool,

    /// Upper bound on the discovery document size in bytes.
    pub max_metadata_size: usize,

    /// Extra query parameters for the authorization request (e.g. `prompt`).
    pub extra_auth_params: BTreeMap<String, String>,
}

impl Default for OidcClientConfig {
    fn default() -> Self {
        Self {
            discovery_url: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: "http://localhost:3000/login/callback".to_string(),
            post_logout_redirect_uri: "http://localhost:3000/logout/callback".to_string(),
            post_login_path: "/user".to_string(),
            scopes: vec![
                "openid".to_string(),
                "email".to_string(),
                "profile".to_string(),
            ],
            response_mode: ResponseMode::Query,
            use_nonce: true,
            token_auth_method: ClientAuthMethod::ClientSecretPost,
            request_timeout: Duration::from_secs(10),
            clock_skew_leeway: Duration::from_secs(60),
            allow_http: false,
            validate_issuer: true,
            max_metadata_size: 1024 * 1024,
            extra_auth_params: BTreeMap::new(),
        }
    }
}

impl OidcClientConfig {
    /// Scopes joined for the `scope` parameter.
    #[must_use]
    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }
}

/// Signed cookie settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CookieConfig {
    /// HMAC key for signing cookie values.
    pub secret: String,

    /// Cookie carrying the signed access token.
    pub token_cookie_name: String,

    /// Cookie carrying the signed session id.
    pub session_cookie_name: String,

    /// Set the `Secure` attribute. Enable in production.
    pub secure: bool,

    pub same_site: SameSitePolicy,

    pub path: String,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            token_cookie_name: "access_token".to_string(),
            session_cookie_name: "sid".to_string(),
            secure: false,
            same_site: SameSitePolicy::Lax,
            path: "/".to_string(),
        }
    }
}

/// Server-side session lifetime.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sessions untouched for this long are treated as absent.
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,

    /// How often expired sessions are purged.
    #[serde(with = "humantime_serde")]
    pub purge_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(8 * 3600),
            purge_interval: Duration::from_secs(300),
        }
    }
}

/// Client credentials flow options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientCredentialsConfig {
    /// Optional `scope` parameter (e.g. `api://resource/.default`).
    pub scope: Option<String>,

    pub auth_method: ClientAuthMethod,

    /// Protected API to call with the issued token.
    pub resource: Option<ResourceRequest>,
}

impl Default for ClientCredentialsConfig {
    fn default() -> Self {
        Self {
            scope: None,
            auth_method: ClientAuthMethod::ClientSecretBasic,
            resource: None,
        }
    }
}
