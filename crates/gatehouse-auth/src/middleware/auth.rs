//! Authentication extractor.

use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum::response::Redirect;
use axum_extra::extract::CookieJar;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::service::RelyingParty;
use crate::session::cookie::SignedToken;

/// Where unauthenticated browsers are sent.
pub const LOGIN_PATH: &str = "/login";

/// Router state shared by the relying-party handlers.
#[derive(Clone)]
pub struct RelyingPartyState {
    pub relying_party: Arc<RelyingParty>,
}

impl RelyingPartyState {
    #[must_use]
    pub fn new(relying_party: Arc<RelyingParty>) -> Self {
        Self { relying_party }
    }
}

/// Session id from the signed session cookie, if present and valid.
#[must_use]
pub fn session_id_from_jar(relying_party: &RelyingParty, jar: &CookieJar) -> Option<Uuid> {
    let signer = relying_party.signer().ok()?;
    let cookie = jar.get(&relying_party.config().cookie.session_cookie_name)?;
    signer.verify_session_id(cookie.value())
}

/// Extractor that only succeeds for requests passing the authentication gate.
///
/// Rejects with a redirect to the login route.
#[derive(Debug, Clone)]
pub struct RequireAuth {
    /// The verified access token.
    pub token: SignedToken,
    /// Session id from the session cookie, when one accompanies the token.
    pub session_id: Option<Uuid>,
}

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
    RelyingPartyState: FromRef<S>,
{
    type Rejection = Redirect;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = RelyingPartyState::from_ref(state);
        let relying_party = &state.relying_party;
        let jar = CookieJar::from_headers(&parts.headers);

        let token = relying_party
            .gate()
            .ok()
            .and_then(|gate| gate.authenticated_token(&jar, OffsetDateTime::now_utc()));

        match token {
            Some(token) => Ok(RequireAuth {
                token,
                session_id: session_id_from_jar(relying_party, &jar),
            }),
            None => {
                tracing::debug!(path = %parts.uri.path(), "Unauthenticated request redirected to login");
                Err(Redirect::to(LOGIN_PATH))
            }
        }
    }
}
