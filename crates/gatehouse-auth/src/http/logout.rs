//! Logout handlers.

use axum::extract::State;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::CookieJar;

use crate::middleware::error::LANDING_PATH;
use crate::middleware::{RelyingPartyState, session_id_from_jar};
use crate::session::cookie::removal_cookie;

/// `GET /logout`
///
/// Cookies are cleared even when building the provider redirect fails.
pub async fn logout(State(state): State<RelyingPartyState>, jar: CookieJar) -> Response {
    let rp = &state.relying_party;
    let cookies = &rp.config().cookie;

    let session_id = session_id_from_jar(rp, &jar);
    let jar = jar
        .remove(removal_cookie(&cookies.token_cookie_name, cookies))
        .remove(removal_cookie(&cookies.session_cookie_name, cookies));

    match rp.logout(session_id).await {
        Ok(url) => (jar, Redirect::to(url.as_str())).into_response(),
        Err(err) => (jar, err).into_response(),
    }
}

/// `GET /logout/callback`
pub async fn logout_callback() -> Redirect {
    Redirect::to(LANDING_PATH)
}
