//! Authorization callback handlers.

use axum::Form;
use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum_extra::extract::CookieJar;
use time::OffsetDateTime;

use crate::config::ResponseMode;
use crate::error::AuthError;
use crate::middleware::{RelyingPartyState, session_id_from_jar};
use crate::oidc::callback::CallbackParams;
use crate::session::cookie::{session_cookie, token_cookie};

/// Page served to the browser in `fragment` mode. The authorization response
/// sits in `location.hash`, which never reaches the server, so the page posts
/// it back to the same path as a form.
const FRAGMENT_RELAY_PAGE: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Signing in</title></head>
<body>
<form id="relay" method="post"></form>
<script>
const form = document.getElementById("relay");
new URLSearchParams(window.location.hash.slice(1)).forEach((value, name) => {
  const input = document.createElement("input");
  input.type = "hidden";
  input.name = name;
  input.value = value;
  form.appendChild(input);
});
history.replaceState(null, "", window.location.pathname);
form.submit();
</script>
<noscript>JavaScript is required to complete sign-in.</noscript>
</body>
</html>
"#;

/// `GET /login/callback` for the `query` response mode, and the relay page
/// for the `fragment` response mode.
pub async fn callback_query(
    State(state): State<RelyingPartyState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<Response, AuthError> {
    if state.relying_party.config().oidc.response_mode == ResponseMode::Fragment
        && params.is_empty()
    {
        return Ok(Html(FRAGMENT_RELAY_PAGE).into_response());
    }
    Ok(complete_login(&state, jar, params).await?.into_response())
}

/// `POST /login/callback` for the `form_post` response mode and relayed fragments.
pub async fn callback_form(
    State(state): State<RelyingPartyState>,
    jar: CookieJar,
    Form(params): Form<CallbackParams>,
) -> Result<(CookieJar, Redirect), AuthError> {
    complete_login(&state, jar, params).await
}

async fn complete_login(
    state: &RelyingPartyState,
    jar: CookieJar,
    params: CallbackParams,
) -> Result<(CookieJar, Redirect), AuthError> {
    let rp = &state.relying_party;
    let signer = rp.signer()?;
    let cookies = &rp.config().cookie;

    // Without a session cookie there is nothing to match the state against
    let session_id = session_id_from_jar(rp, &jar).ok_or(AuthError::MissingPendingAuthorization)?;
    let session = rp.handle_callback(session_id, params).await?;

    let tokens = &session.tokens;
    let max_age = tokens.remaining_secs(OffsetDateTime::now_utc());
    let token = token_cookie(cookies, signer.sign_token(tokens), max_age);
    let sid = session_cookie(cookies, signer.sign_session_id(session.session_id));

    tracing::info!(
        session = %session.session_id,
        subject = %session.identity.subject,
        "Login completed"
    );

    Ok((
        jar.add(sid).add(token),
        Redirect::to(&rp.config().oidc.post_login_path),
    ))
}
