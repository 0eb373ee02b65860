//! End-user identity from userinfo or ID token claims.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::id_token::IdTokenClaims;
use crate::error::AuthError;

/// Identity of the logged-in user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Provider subject identifier (`sub`).
    #[serde(rename = "sub")]
    pub subject: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,

    /// Remaining claims as returned by the provider.
    #[serde(flatten)]
    pub claims: BTreeMap<String, serde_json::Value>,
}

impl UserIdentity {
    /// Identity built from ID token claims, for providers without userinfo.
    #[must_use]
    pub fn from_id_token(claims: &IdTokenClaims) -> Self {
        Self {
            subject: claims.sub.clone(),
            email: claims.email.clone(),
            email_verified: claims.email_verified,
            name: claims.name.clone(),
            given_name: claims.given_name.clone(),
            family_name: claims.family_name.clone(),
            preferred_username: claims.preferred_username.clone(),
            picture: claims.picture.clone(),
            locale: claims.locale.clone(),
            claims: claims
                .extra
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Best human-readable label.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.preferred_username.as_deref())
            .or(self.email.as_deref())
            .unwrap_or(&self.subject)
    }
}

/// Fetch claims from the userinfo endpoint with the access token as bearer.
///
/// # Errors
///
/// `Http` for a non-success status, `TokenExchange` on timeout, `Network`
/// for other transport failures, `InvalidResponse` if the body is not a
/// claims object with `sub`.
pub async fn fetch_userinfo(
    http_client: &reqwest::Client,
    userinfo_endpoint: &str,
    access_token: &str,
) -> Result<UserIdentity, AuthError> {
    let response = http_client
        .get(userinfo_endpoint)
        .bearer_auth(access_token)
        .header("Accept", "application/json")
        .send()
        .await
        .map_err(|e| AuthError::transport(e, "userinfo endpoint"))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), "Userinfo request failed");
        return Err(AuthError::http(status.as_u16(), body, "userinfo endpoint"));
    }

    response
        .json()
        .await
        .map_err(|e| AuthError::invalid_response(format!("failed to parse userinfo response: {e}")))
}
