//! Authorization request construction.
//!
//! # Flow
//!
//! ```text
//! begin_login(session)
//!     ├─► fetch provider metadata (cached)
//!     ├─► generate verifier, S256 challenge, state, nonce
//!     ├─► store PendingAuthorization for the session (replaces any earlier one)
//!     └─► return authorization_endpoint?response_type=code&...
//! ```

use url::Url;
use uuid::Uuid;

use super::metadata::ProviderMetadata;
use super::pkce::PkceChallengeMethod;
use crate::AuthResult;
use crate::config::OidcClientConfig;
use crate::error::AuthError;
use crate::service::RelyingParty;
use crate::session::types::PendingAuthorization;

/// Parameters the relying party sets itself; extra parameters may not override them.
const RESERVED_PARAMS: &[&str] = &[
    "response_type",
    "response_mode",
    "client_id",
    "redirect_uri",
    "scope",
    "state",
    "nonce",
    "code_challenge",
    "code_challenge_method",
];

impl RelyingParty {
    /// Start a login for `session_id` and return the provider redirect URL.
    ///
    /// A second call for the same session replaces the pending authorization,
    /// so a callback for the first attempt then fails with `StateMismatch`.
    ///
    /// # Errors
    ///
    /// `Configuration` if metadata is unavailable or the authorization
    /// endpoint is malformed; store failures are propagated.
    pub async fn begin_login(&self, session_id: Uuid) -> AuthResult<Url> {
        let metadata = self.fetch_metadata().await?;
        let oidc = &self.config.oidc;

        let pending = PendingAuthorization::generate(&oidc.redirect_uri, oidc.use_nonce);
        let url = build_authorization_url(&metadata, oidc, &pending)?;

        self.store.put_pending(session_id, pending).await?;

        tracing::info!(
            session = %session_id,
            response_mode = oidc.response_mode.as_str(),
            "Login started"
        );

        Ok(url)
    }
}

/// Build the authorization request URL for a pending authorization.
///
/// # Errors
///
/// Returns `Configuration` if the authorization endpoint is not a URL.
pub fn build_authorization_url(
    metadata: &ProviderMetadata,
    config: &OidcClientConfig,
    pending: &PendingAuthorization,
) -> AuthResult<Url> {
    let mut url = Url::parse(&metadata.authorization_endpoint).map_err(|e| {
        AuthError::configuration(format!("invalid authorization_endpoint: {e}"))
    })?;

    if !metadata.supports_pkce_s256() {
        tracing::warn!(issuer = %metadata.issuer, "Provider does not advertise S256 PKCE; sending it anyway");
    }
    if !metadata.supports_response_mode(config.response_mode) {
        tracing::warn!(
            issuer = %metadata.issuer,
            response_mode = config.response_mode.as_str(),
            "Provider does not advertise the configured response mode"
        );
    }

    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("response_type", "code")
            .append_pair("response_mode", config.response_mode.as_str())
            .append_pair("client_id", &config.client_id)
            .append_pair("redirect_uri", &pending.redirect_uri)
            .append_pair("scope", &config.scope_param())
            .append_pair("state", &pending.state)
            .append_pair("code_challenge", &pending.code_challenge)
            .append_pair("code_challenge_method", PkceChallengeMethod::S256.as_str());

        if let Some(nonce) = &pending.nonce {
            query.append_pair("nonce", nonce);
        }

        for (key, value) in &config.extra_auth_params {
            if RESERVED_PARAMS.contains(&key.as_str()) {
                tracing::warn!(param = %key, "Ignoring extra authorization parameter that overrides a protocol parameter");
                continue;
            }
            query.append_pair(key, value);
        }
    }

    Ok(url)
}
