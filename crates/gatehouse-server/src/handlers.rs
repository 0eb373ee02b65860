use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::CookieJar;
use gatehouse_auth::RelyingPartyState;
use serde::Serialize;
use serde_json::json;

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
}

/// Public landing page.
pub async fn root(State(state): State<RelyingPartyState>, jar: CookieJar) -> impl IntoResponse {
    let body = json!({
        "service": "Gatehouse",
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "authenticated": state.relying_party.is_authenticated(&jar),
    });
    (StatusCode::OK, Json(body))
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "not_found" })),
    )
}
