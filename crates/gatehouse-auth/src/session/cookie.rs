//! Signed cookies.
//!
//! Values are signed with HMAC-SHA256 under the server cookie secret and
//! serialised as `s:<payload>.<signature>`, the signature being base64url
//! without padding. The access token cookie carries `<expires_at>:<token>`
//! so the gate can reject expired tokens without a store lookup.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use cookie::Cookie;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::config::CookieConfig;
use crate::error::AuthError;
use crate::oidc::token::TokenSet;

type HmacSha256 = Hmac<Sha256>;

const SIGNED_PREFIX: &str = "s:";

/// Access token recovered from a verified cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedToken {
    pub access_token: String,
    /// Unix timestamp (seconds).
    pub expires_at: i64,
}

impl SignedToken {
    #[must_use]
    pub fn is_expired_at(&self, now_unix: i64) -> bool {
        now_unix >= self.expires_at
    }
}

/// Signs and verifies cookie values.
#[derive(Clone)]
pub struct CookieSigner {
    mac: HmacSha256,
}

impl std::fmt::Debug for CookieSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieSigner").finish_non_exhaustive()
    }
}

impl CookieSigner {
    /// Create a signer keyed with the cookie secret.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the secret is empty.
    pub fn new(secret: &str) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::configuration("cookie secret must not be empty"));
        }
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| AuthError::configuration(format!("invalid cookie secret: {e}")))?;
        Ok(Self { mac })
    }

    /// Sign `value` as `s:<value>.<signature>`.
    #[must_use]
    pub fn sign(&self, value: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(value.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{SIGNED_PREFIX}{value}.{signature}")
    }

    /// Verify a signed value and return the payload. `None` if tampered or malformed.
    #[must_use]
    pub fn unsign(&self, signed: &str) -> Option<String> {
        let body = signed.strip_prefix(SIGNED_PREFIX)?;
        let (value, signature) = body.rsplit_once('.')?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;

        let mut mac = self.mac.clone();
        mac.update(value.as_bytes());
        mac.verify_slice(&signature).ok()?;
        Some(value.to_string())
    }

    /// Signed cookie value for an access token.
    #[must_use]
    pub fn sign_token(&self, tokens: &TokenSet) -> String {
        self.sign(&format!("{}:{}", tokens.expires_at, tokens.access_token))
    }

    /// Verify an access token cookie value.
    #[must_use]
    pub fn verify_token(&self, signed: &str) -> Option<SignedToken> {
        let payload = self.unsign(signed)?;
        let (expires_at, access_token) = payload.split_once(':')?;
        Some(SignedToken {
            access_token: access_token.to_string(),
            expires_at: expires_at.parse().ok()?,
        })
    }

    /// Signed cookie value for a session id.
    #[must_use]
    pub fn sign_session_id(&self, id: Uuid) -> String {
        self.sign(&id.to_string())
    }

    #[must_use]
    pub fn verify_session_id(&self, signed: &str) -> Option<Uuid> {
        self.unsign(signed)?.parse().ok()
    }
}

/// Cookie carrying the signed access token; lives as long as the token.
#[must_use]
pub fn token_cookie(config: &CookieConfig, value: String, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build((config.token_cookie_name.clone(), value))
        .http_only(true)
        .secure(config.secure)
        .same_site(config.same_site.to_cookie())
        .path(config.path.clone())
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

/// Cookie carrying the signed session id; a browser-session cookie.
#[must_use]
pub fn session_cookie(config: &CookieConfig, value: String) -> Cookie<'static> {
    Cookie::build((config.session_cookie_name.clone(), value))
        .http_only(true)
        .secure(config.secure)
        .same_site(config.same_site.to_cookie())
        .path(config.path.clone())
        .build()
}

/// Name-and-path-only cookie for `CookieJar::remove`.
#[must_use]
pub fn removal_cookie(name: &str, config: &CookieConfig) -> Cookie<'static> {
    Cookie::build((name.to_string(), ""))
        .path(config.path.clone())
        .build()
}
