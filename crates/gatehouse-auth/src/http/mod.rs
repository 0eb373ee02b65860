//! Browser-facing relying-party handlers.
//!
//! - `GET /login` - start the authorization code flow
//! - `GET|POST /login/callback` - finish it (query or `form_post` response mode)
//! - `GET /logout` - end the session and redirect to the provider
//! - `GET /logout/callback` - landing point after provider logout
//! - `GET /user` - identity of the signed-in user
//!
//! Mount them with [`routes`] or individually.

pub mod callback;
pub mod login;
pub mod logout;
pub mod user;

use axum::Router;
use axum::extract::FromRef;
use axum::routing::get;

pub use callback::{callback_form, callback_query};
pub use login::login;
pub use logout::{logout, logout_callback};
pub use user::current_user;

use crate::middleware::RelyingPartyState;

pub const CALLBACK_PATH: &str = "/login/callback";
pub const LOGOUT_PATH: &str = "/logout";
pub const LOGOUT_CALLBACK_PATH: &str = "/logout/callback";
pub const USER_PATH: &str = "/user";

/// Router with every relying-party route.
pub fn routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    RelyingPartyState: FromRef<S>,
{
    Router::new()
        .route(crate::middleware::auth::LOGIN_PATH, get(login))
        .route(CALLBACK_PATH, get(callback_query).post(callback_form))
        .route(LOGOUT_PATH, get(logout))
        .route(LOGOUT_CALLBACK_PATH, get(logout_callback))
        .route(USER_PATH, get(current_user))
}
