//! Token endpoint client.
//!
//! Shared by the authorization code exchange and the client credentials
//! grant. Requests are form-encoded POSTs; the client authenticates with
//! either HTTP Basic or body credentials. Nothing here retries: an
//! authorization code is single use.

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;
use url::form_urlencoded;

use crate::config::ClientAuthMethod;
use crate::error::AuthError;

/// Lifetime assumed when the provider omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// Tokens issued by the provider, with the expiry pinned to an absolute time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,

    pub token_type: String,

    /// Lifetime in seconds as reported by the provider.
    pub expires_in: u64,

    /// Unix timestamp (seconds) after which the access token is expired.
    pub expires_at: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenSet {
    /// Build a token set from a token endpoint response received at `now`.
    #[must_use]
    pub fn from_response(response: TokenResponse, now: OffsetDateTime) -> Self {
        let expires_in = response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        let expires_at = now
            .unix_timestamp()
            .saturating_add(i64::try_from(expires_in).unwrap_or(i64::MAX));

        Self {
            access_token: response.access_token,
            token_type: response.token_type,
            expires_in,
            expires_at,
            refresh_token: response.refresh_token,
            id_token: response.id_token,
            scope: response.scope,
        }
    }

    /// Whether the access token has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now.unix_timestamp() >= self.expires_at
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    /// Seconds of validity left at `now`, zero once expired.
    #[must_use]
    pub fn remaining_secs(&self, now: OffsetDateTime) -> i64 {
        (self.expires_at - now.unix_timestamp()).max(0)
    }
}

/// Raw token endpoint response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,

    #[serde(default = "default_token_type")]
    pub token_type: String,

    #[serde(default, deserialize_with = "deserialize_expires_in")]
    pub expires_in: Option<u64>,

    pub refresh_token: Option<String>,

    pub id_token: Option<String>,

    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Some providers send `expires_in` as a string.
fn deserialize_expires_in<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        String(String),
    }

    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// OAuth error response body.
#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// Client identity presented to the token endpoint.
#[derive(Debug, Clone, Copy)]
pub struct ClientAuth<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub method: ClientAuthMethod,
}

/// POST a grant to the token endpoint and parse the resulting token set.
///
/// # Errors
///
/// - `TokenExchange` for a non-success status or a timeout
/// - `Network` for other transport failures
/// - `InvalidResponse` if the success body is not a token response
pub async fn request_token(
    http_client: &reqwest::Client,
    token_endpoint: &str,
    client: ClientAuth<'_>,
    grant: &[(&str, &str)],
) -> Result<TokenSet, AuthError> {
    let mut params: Vec<(&str, &str)> = grant.to_vec();

    let mut request = http_client.post(token_endpoint);
    match client.method {
        ClientAuthMethod::ClientSecretBasic => {
            // RFC 6749 2.3.1: credentials are form-encoded before Basic encoding
            let id: String = form_urlencoded::byte_serialize(client.client_id.as_bytes()).collect();
            let secret: String =
                form_urlencoded::byte_serialize(client.client_secret.as_bytes()).collect();
            request = request.basic_auth(id, Some(secret));
        }
        ClientAuthMethod::ClientSecretPost => {
            params.push(("client_id", client.client_id));
            params.push(("client_secret", client.client_secret));
        }
    }

    let grant_type = grant
        .iter()
        .find(|(k, _)| *k == "grant_type")
        .map(|(_, v)| *v)
        .unwrap_or("unknown");
    tracing::debug!(
        endpoint = %token_endpoint,
        grant_type,
        auth_method = client.method.as_str(),
        "Requesting token"
    );

    let response = request
        .header("Accept", "application/json")
        .form(&params)
        .send()
        .await
        .map_err(|e| AuthError::transport(e, "token endpoint"))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let provider_error = serde_json::from_str::<OAuthErrorResponse>(&body).ok();

        tracing::warn!(
            status = status.as_u16(),
            error = provider_error.as_ref().map(|e| e.error.as_str()),
            error_description = provider_error
                .as_ref()
                .and_then(|e| e.error_description.as_deref()),
            grant_type,
            "Token endpoint rejected request"
        );

        return Err(AuthError::token_exchange_http(
            status.as_u16(),
            provider_error.map(|e| e.error),
            &body,
        ));
    }

    let received_at = OffsetDateTime::now_utc();
    let token_response: TokenResponse = response.json().await.map_err(|e| {
        AuthError::invalid_response(format!("failed to parse token response: {e}"))
    })?;

    Ok(TokenSet::from_response(token_response, received_at))
}
