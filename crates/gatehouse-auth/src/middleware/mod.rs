//! HTTP middleware for the relying party.
//!
//! - [`RequireAuth`] guards routes behind the authentication gate
//! - `IntoResponse` for [`AuthError`](crate::AuthError) maps failures to
//!   redirects or a generic error page
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use gatehouse_auth::middleware::{RelyingPartyState, RequireAuth};
//!
//! async fn protected(auth: RequireAuth) -> String {
//!     format!("token expires at {}", auth.token.expires_at)
//! }
//!
//! let app = Router::new()
//!     .route("/protected", get(protected))
//!     .with_state(RelyingPartyState::new(relying_party));
//! ```

pub mod auth;
pub mod error;

pub use auth::{RelyingPartyState, RequireAuth, session_id_from_jar};
