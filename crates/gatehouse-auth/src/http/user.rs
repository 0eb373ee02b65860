//! Signed-in user endpoint.

use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Redirect, Response};
use serde::Serialize;

use crate::error::AuthError;
use crate::middleware::auth::LOGIN_PATH;
use crate::middleware::{RelyingPartyState, RequireAuth};
use crate::oidc::identity::UserIdentity;

#[derive(Debug, Serialize)]
pub struct UserResponse {
    #[serde(flatten)]
    pub identity: UserIdentity,
    pub display_name: String,
    /// Unix timestamp (seconds) at which the access token expires.
    pub expires_at: i64,
}

/// `GET /user`
///
/// Requires a valid token cookie and a live session; a token whose server
/// session was purged sends the browser back to login.
pub async fn current_user(
    State(state): State<RelyingPartyState>,
    auth: RequireAuth,
) -> Result<Response, AuthError> {
    let Some(session_id) = auth.session_id else {
        return Ok(Redirect::to(LOGIN_PATH).into_response());
    };

    match state.relying_party.session(session_id).await? {
        Some(session) => Ok(Json(UserResponse {
            display_name: session.identity.display_name().to_string(),
            identity: session.identity,
            expires_at: auth.token.expires_at,
        })
        .into_response()),
        None => Ok(Redirect::to(LOGIN_PATH).into_response()),
    }
}
