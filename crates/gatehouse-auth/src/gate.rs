//! Authentication gate for protected routes.

use axum_extra::extract::CookieJar;
use time::OffsetDateTime;

use crate::session::cookie::{CookieSigner, SignedToken};

/// Decides whether a request carries a valid, unexpired access token cookie.
///
/// Purely a read: the gate never touches the session store.
#[derive(Debug, Clone)]
pub struct AuthGate {
    signer: CookieSigner,
    cookie_name: String,
}

impl AuthGate {
    #[must_use]
    pub fn new(signer: CookieSigner, cookie_name: impl Into<String>) -> Self {
        Self {
            signer,
            cookie_name: cookie_name.into(),
        }
    }

    /// `true` only if the cookie is present, correctly signed and unexpired.
    #[must_use]
    pub fn is_authenticated(&self, jar: &CookieJar) -> bool {
        self.authenticated_token(jar, OffsetDateTime::now_utc())
            .is_some()
    }

    /// The verified token when the request passes the gate at `now`.
    #[must_use]
    pub fn authenticated_token(&self, jar: &CookieJar, now: OffsetDateTime) -> Option<SignedToken> {
        let cookie = jar.get(&self.cookie_name)?;
        let Some(token) = self.signer.verify_token(cookie.value()) else {
            tracing::debug!(cookie = %self.cookie_name, "Rejected cookie with invalid signature");
            return None;
        };
        if token.is_expired_at(now.unix_timestamp()) {
            tracing::debug!(expires_at = token.expires_at, "Rejected expired access token cookie");
            return None;
        }
        Some(token)
    }
}
