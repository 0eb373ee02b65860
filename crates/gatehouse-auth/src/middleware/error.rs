//! Error responses.
//!
//! Validation, provider and exchange failures send the browser back to the
//! landing page; anything else renders a generic 500 page. Details are only
//! ever logged.

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};

use crate::error::AuthError;

/// Where failed logins land.
pub const LANDING_PATH: &str = "/";

const ERROR_PAGE: &str = "<!doctype html><html><head><title>Error</title></head>\
<body><h1>Something went wrong</h1><p>Please try again later.</p></body></html>";

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let category = self.category();

        if self.is_redirectable() {
            match &self {
                AuthError::TokenExchange {
                    message,
                    status,
                    provider_error,
                } => tracing::warn!(
                    %category,
                    status = ?status,
                    provider_error = ?provider_error,
                    message = %message,
                    "Login failed"
                ),
                AuthError::ProviderDenied { error, description } => tracing::warn!(
                    %category,
                    error = %error,
                    description = ?description,
                    "Login failed"
                ),
                other => tracing::warn!(%category, error = %other, "Login failed"),
            }
            return Redirect::to(LANDING_PATH).into_response();
        }

        tracing::error!(%category, error = %self, "Request failed");
        internal_error_page()
    }
}

/// Generic 500 page with no error detail.
#[must_use]
pub fn internal_error_page() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Html(ERROR_PAGE)).into_response()
}
