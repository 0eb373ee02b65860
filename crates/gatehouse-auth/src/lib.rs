//! # gatehouse-auth
//!
//! OpenID Connect relying party for axum applications.
//!
//! This crate provides:
//! - Authorization Code flow with PKCE (S256), state and nonce
//! - Client Credentials flow for machine tokens
//! - Provider discovery with a process-wide metadata cache
//! - HMAC-signed session and access token cookies
//! - An authentication gate and extractor for protected routes
//! - RP-initiated logout
//!
//! ## Modules
//!
//! - [`config`] - Relying-party configuration
//! - [`service`] - The [`RelyingParty`] and its operations
//! - [`oidc`] - Protocol implementation
//! - [`session`] - Session store and signed cookies
//! - [`gate`] - Authentication gate
//! - [`middleware`] - Extractors and error responses
//! - [`http`] - Axum handlers for the browser flow

pub mod config;
pub mod error;
pub mod gate;
pub mod http;
pub mod middleware;
pub mod oidc;
pub mod service;
pub mod session;

#[cfg(test)]
mod test_support;

pub use config::{
    AuthFlow, ClientAuthMethod, ClientCredentialsConfig, CookieConfig, OidcClientConfig,
    RelyingPartyConfig, ResponseMode, SameSitePolicy, SessionConfig,
};
pub use error::{AuthError, ErrorCategory};
pub use gate::AuthGate;
pub use middleware::{RelyingPartyState, RequireAuth};
pub use oidc::{CallbackParams, ProviderMetadata, TokenSet, UserIdentity};
pub use service::RelyingParty;
pub use session::{AuthenticatedSession, InMemorySessionStore, SessionStore};

/// Type alias for relying-party results.
pub type AuthResult<T> = Result<T, AuthError>;
