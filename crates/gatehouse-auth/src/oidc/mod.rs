//! OpenID Connect protocol pieces.
//!
//! - [`discovery`] - provider metadata retrieval and caching
//! - [`pkce`] - code verifier, challenge, state and nonce generation
//! - [`authorize`] - authorization request construction (`begin_login`)
//! - [`callback`] - callback validation and code exchange (`handle_callback`)
//! - [`token`] - token endpoint requests
//! - [`id_token`] - ID token signature and claim validation
//! - [`jwks`] - provider signing key cache
//! - [`identity`] - userinfo and identity claims
//! - [`client_credentials`] - machine-to-machine tokens
//! - [`resource`] - bearer calls to protected APIs

pub mod authorize;
pub mod callback;
pub mod client_credentials;
pub mod discovery;
pub mod id_token;
pub mod identity;
pub mod jwks;
pub mod metadata;
pub mod pkce;
pub mod resource;
pub mod token;

pub use authorize::build_authorization_url;
pub use callback::CallbackParams;
pub use client_credentials::fetch_client_credentials_token;
pub use discovery::{DiscoveryConfig, DiscoveryError, MetadataResolver};
pub use id_token::{IdTokenClaims, IdTokenExpectations};
pub use identity::{UserIdentity, fetch_userinfo};
pub use jwks::{JwksCache, JwksCacheConfig, JwksError};
pub use metadata::ProviderMetadata;
pub use pkce::{PkceChallenge, PkceChallengeMethod, PkceError, PkceVerifier};
pub use resource::{ResourceMethod, ResourceRequest, call_resource};
pub use token::{ClientAuth, TokenSet};
