//! Relying-party service.
//!
//! [`RelyingParty`] owns the provider metadata resolver, the signing key
//! cache, the session store, the cookie signer and the outbound HTTP client. The login, callback and
//! client credentials operations are implemented next to their protocol code
//! in [`crate::oidc`]; logout and session lookups live here.

use std::sync::Arc;

use axum_extra::extract::CookieJar;
use url::Url;
use uuid::Uuid;

use crate::AuthResult;
use crate::config::RelyingPartyConfig;
use crate::error::AuthError;
use crate::gate::AuthGate;
use crate::oidc::discovery::{DiscoveryConfig, MetadataResolver};
use crate::oidc::jwks::{JwksCache, JwksCacheConfig};
use crate::oidc::metadata::ProviderMetadata;
use crate::session::cookie::CookieSigner;
use crate::session::store::SessionStore;
use crate::session::types::AuthenticatedSession;

/// OpenID Connect relying party.
pub struct RelyingParty {
    pub(crate) config: RelyingPartyConfig,
    pub(crate) http_client: reqwest::Client,
    pub(crate) resolver: MetadataResolver,
    pub(crate) jwks: JwksCache,
    pub(crate) store: Arc<dyn SessionStore>,
    pub(crate) signer: Option<CookieSigner>,
    pub(crate) gate: Option<AuthGate>,
}

impl std::fmt::Debug for RelyingParty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelyingParty")
            .field("flow", &self.config.flow)
            .field("client_id", &self.config.oidc.client_id)
            .field("discovery_url", &self.resolver.discovery_url().as_str())
            .finish_non_exhaustive()
    }
}

impl RelyingParty {
    /// Build a relying party. No network calls are made.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the configuration is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: RelyingPartyConfig, store: Arc<dyn SessionStore>) -> AuthResult<Self> {
        config.validate()?;

        let http_client = reqwest::Client::builder()
            .timeout(config.oidc.request_timeout)
            .user_agent(concat!("gatehouse/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AuthError::configuration(format!("failed to build HTTP client: {e}")))?;

        let discovery = DiscoveryConfig::default()
            .with_allow_http(config.oidc.allow_http)
            .with_issuer_validation(config.oidc.validate_issuer)
            .with_max_response_size(config.oidc.max_metadata_size);
        let resolver =
            MetadataResolver::new(&config.oidc.discovery_url, http_client.clone(), discovery)?;
        let jwks = JwksCache::new(
            http_client.clone(),
            JwksCacheConfig::default()
                .with_allow_http(config.oidc.allow_http)
                .with_max_response_size(config.oidc.max_metadata_size),
        );

        // The client credentials flow sets no cookies and may run without a secret
        let signer = if config.cookie.secret.is_empty() {
            None
        } else {
            Some(CookieSigner::new(&config.cookie.secret)?)
        };
        let gate = signer
            .clone()
            .map(|s| AuthGate::new(s, config.cookie.token_cookie_name.clone()));

        Ok(Self {
            config,
            http_client,
            resolver,
            jwks,
            store,
            signer,
            gate,
        })
    }

    #[must_use]
    pub fn config(&self) -> &RelyingPartyConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Cookie signer for the browser flow.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if no cookie secret was configured.
    pub fn signer(&self) -> AuthResult<&CookieSigner> {
        self.signer
            .as_ref()
            .ok_or_else(|| AuthError::configuration("cookie.secret is required"))
    }

    /// Authentication gate for protected routes.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if no cookie secret was configured.
    pub fn gate(&self) -> AuthResult<&AuthGate> {
        self.gate
            .as_ref()
            .ok_or_else(|| AuthError::configuration("cookie.secret is required"))
    }

    /// Provider metadata, fetched on first use and cached for the process lifetime.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if discovery fails.
    pub async fn fetch_metadata(&self) -> AuthResult<Arc<ProviderMetadata>> {
        Ok(self.resolver.fetch_metadata().await?)
    }

    /// Whether the request cookies pass the authentication gate.
    #[must_use]
    pub fn is_authenticated(&self, jar: &CookieJar) -> bool {
        self.gate
            .as_ref()
            .is_some_and(|gate| gate.is_authenticated(jar))
    }

    /// Completed login for a session, if any.
    ///
    /// # Errors
    ///
    /// Propagates session store failures.
    pub async fn session(&self, session_id: Uuid) -> AuthResult<Option<AuthenticatedSession>> {
        self.store.authenticated(session_id).await
    }

    /// End the local session and return where to send the browser.
    ///
    /// Removes the session record (pending and authenticated) and returns the
    /// provider's end-session URL with `post_logout_redirect_uri`,
    /// `client_id` and, when known, `id_token_hint`. Without an advertised
    /// end-session endpoint the local post-logout URI is returned. Safe to
    /// call repeatedly.
    ///
    /// # Errors
    ///
    /// Propagates session store and metadata failures.
    pub async fn logout(&self, session_id: Option<Uuid>) -> AuthResult<Url> {
        let removed = match session_id {
            Some(id) => self.store.remove(id).await?,
            None => None,
        };
        let id_token_hint = removed
            .and_then(|record| record.authenticated)
            .and_then(|session| session.tokens.id_token);

        if let Some(id) = session_id {
            tracing::info!(session = %id, "Session ended");
        }

        let metadata = self.fetch_metadata().await?;
        end_session_url(&metadata, &self.config, id_token_hint.as_deref())
    }
}

/// Provider end-session URL, or the local post-logout URI when none is advertised.
fn end_session_url(
    metadata: &ProviderMetadata,
    config: &RelyingPartyConfig,
    id_token_hint: Option<&str>,
) -> AuthResult<Url> {
    let post_logout = &config.oidc.post_logout_redirect_uri;

    let Some(endpoint) = metadata.end_session_endpoint.as_deref() else {
        return Url::parse(post_logout).map_err(|e| {
            AuthError::configuration(format!("invalid post_logout_redirect_uri: {e}"))
        });
    };

    let mut url = Url::parse(endpoint)
        .map_err(|e| AuthError::configuration(format!("invalid end_session_endpoint: {e}")))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("post_logout_redirect_uri", post_logout);
        query.append_pair("client_id", &config.oidc.client_id);
        if let Some(hint) = id_token_hint {
            query.append_pair("id_token_hint", hint);
        }
    }
    Ok(url)
}
