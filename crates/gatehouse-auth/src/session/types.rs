//! Session data.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::oidc::identity::UserIdentity;
use crate::oidc::pkce::{derive_challenge, generate_nonce, generate_state, generate_verifier};
use crate::oidc::token::TokenSet;

/// How long a login may take between redirect and callback.
pub const PENDING_AUTHORIZATION_TTL_SECS: u64 = 600;

/// One-time secrets bound to a session between `begin_login` and the callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub code_verifier: String,

    /// S256 challenge of `code_verifier`.
    pub code_challenge: String,

    /// `None` when nonces are disabled.
    pub nonce: Option<String>,

    pub state: String,

    /// Redirect URI sent in the authorization request; must be repeated at the token endpoint.
    pub redirect_uri: String,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl PendingAuthorization {
    /// Fresh verifier, challenge, state and (optionally) nonce.
    #[must_use]
    pub fn generate(redirect_uri: impl Into<String>, with_nonce: bool) -> Self {
        let code_verifier = generate_verifier();
        let code_challenge = derive_challenge(&code_verifier);

        Self {
            code_verifier,
            code_challenge,
            nonce: with_nonce.then(generate_nonce),
            state: generate_state(),
            redirect_uri: redirect_uri.into(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Whether the login has been outstanding longer than allowed at `now`.
    #[must_use]
    pub fn is_stale_at(&self, now: OffsetDateTime) -> bool {
        now - self.created_at > Duration::from_secs(PENDING_AUTHORIZATION_TTL_SECS)
    }
}

/// A completed login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedSession {
    pub session_id: Uuid,

    pub tokens: TokenSet,

    pub identity: UserIdentity,

    #[serde(with = "time::serde::rfc3339")]
    pub authenticated_at: OffsetDateTime,
}

/// Everything the store keeps for one browser session.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: Uuid,
    pub pending: Option<PendingAuthorization>,
    pub authenticated: Option<AuthenticatedSession>,
    pub created_at: OffsetDateTime,
    pub last_seen_at: OffsetDateTime,
}

impl SessionRecord {
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id,
            pending: None,
            authenticated: None,
            created_at: now,
            last_seen_at: now,
        }
    }

    /// Whether the session has been idle longer than `idle_timeout` at `now`.
    #[must_use]
    pub fn is_idle(&self, idle_timeout: Duration, now: OffsetDateTime) -> bool {
        now - self.last_seen_at > idle_timeout
    }

    pub fn touch(&mut self) {
        self.last_seen_at = OffsetDateTime::now_utc();
    }
}
