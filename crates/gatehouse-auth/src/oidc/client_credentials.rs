//! Client credentials grant (RFC 6749 section 4.4).

use super::token::{ClientAuth, TokenSet, request_token};
use crate::AuthResult;
use crate::config::ClientAuthMethod;
use crate::service::RelyingParty;

/// Request a machine token. Stateless; no retries.
///
/// # Errors
///
/// `TokenExchange` for a non-success status or timeout, `Network` or
/// `InvalidResponse` otherwise.
pub async fn fetch_client_credentials_token(
    http_client: &reqwest::Client,
    token_endpoint: &str,
    client_id: &str,
    client_secret: &str,
    method: ClientAuthMethod,
    scope: Option<&str>,
) -> AuthResult<TokenSet> {
    let mut grant = vec![("grant_type", "client_credentials")];
    if let Some(scope) = scope {
        grant.push(("scope", scope));
    }

    let client = ClientAuth {
        client_id,
        client_secret,
        method,
    };
    let tokens = request_token(http_client, token_endpoint, client, &grant).await?;

    tracing::info!(
        client_id,
        expires_at = tokens.expires_at,
        "Client credentials token issued"
    );

    Ok(tokens)
}

impl RelyingParty {
    /// Fetch a machine token for the configured client from the provider's token endpoint.
    ///
    /// # Errors
    ///
    /// `Configuration` if metadata is unavailable, otherwise as
    /// [`fetch_client_credentials_token`].
    pub async fn fetch_client_credentials_token(&self) -> AuthResult<TokenSet> {
        let metadata = self.fetch_metadata().await?;
        let oidc = &self.config.oidc;
        let options = &self.config.client_credentials;

        fetch_client_credentials_token(
            &self.http_client,
            &metadata.token_endpoint,
            &oidc.client_id,
            &oidc.client_secret,
            options.auth_method,
            options.scope.as_deref(),
        )
        .await
    }
}
