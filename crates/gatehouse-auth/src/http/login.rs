//! Login initiation handler.

use axum::extract::State;
use axum::response::Redirect;
use axum_extra::extract::CookieJar;
use uuid::Uuid;

use crate::error::AuthError;
use crate::middleware::{RelyingPartyState, session_id_from_jar};
use crate::session::cookie::session_cookie;

/// `GET /login`
///
/// Reuses the browser's session when it carries a valid session cookie,
/// otherwise starts a new one, then redirects to the provider.
pub async fn login(
    State(state): State<RelyingPartyState>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AuthError> {
    let rp = &state.relying_party;
    let signer = rp.signer()?;

    let session_id = session_id_from_jar(rp, &jar).unwrap_or_else(Uuid::new_v4);
    let url = rp.begin_login(session_id).await?;

    let cookie = session_cookie(&rp.config().cookie, signer.sign_session_id(session_id));
    Ok((jar.add(cookie), Redirect::to(url.as_str())))
}
