//! Server-side session storage.
//!
//! The store holds pending authorizations and completed logins keyed by the
//! session id carried in the signed session cookie.
//!
//! # Implementation Notes
//!
//! Implementations must:
//!
//! - Make `take_pending` atomic so one callback consumes a pending login
//! - Treat sessions idle past the configured timeout as absent
//! - Never log verifiers, nonces or tokens

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::types::{AuthenticatedSession, PendingAuthorization, SessionRecord};
use crate::AuthResult;
use crate::oidc::pkce::constant_time_eq;

/// Outcome of consuming a pending authorization.
#[derive(Debug)]
pub enum PendingLookup {
    /// The state matched; the pending authorization has been removed.
    Found(PendingAuthorization),
    /// No pending authorization for the session.
    Missing,
    /// A pending authorization exists but its state differs. It is left in place.
    StateMismatch,
}

/// Storage for browser sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Stores a pending authorization, replacing any previous one.
    async fn put_pending(&self, id: Uuid, pending: PendingAuthorization) -> AuthResult<()>;

    /// Removes and returns the pending authorization if its state equals `state`.
    async fn take_pending(&self, id: Uuid, state: &str) -> AuthResult<PendingLookup>;

    /// Records a completed login.
    async fn put_authenticated(&self, session: AuthenticatedSession) -> AuthResult<()>;

    /// Returns the completed login for a session, refreshing its idle timer.
    async fn authenticated(&self, id: Uuid) -> AuthResult<Option<AuthenticatedSession>>;

    /// Deletes a session and returns what it held.
    async fn remove(&self, id: Uuid) -> AuthResult<Option<SessionRecord>>;

    /// Deletes idle sessions. Returns how many were removed.
    async fn purge_expired(&self) -> AuthResult<usize>;
}

/// In-process session store.
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<Uuid, SessionRecord>>,
    idle_timeout: Duration,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
        }
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Live record for `id`, dropping it first if it has gone idle.
    fn live<'a>(
        &self,
        sessions: &'a mut HashMap<Uuid, SessionRecord>,
        id: Uuid,
    ) -> Option<&'a mut SessionRecord> {
        let now = OffsetDateTime::now_utc();
        if sessions
            .get(&id)
            .is_some_and(|r| r.is_idle(self.idle_timeout, now))
        {
            sessions.remove(&id);
            tracing::debug!(session = %id, "Session expired");
            return None;
        }
        sessions.get_mut(&id)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn put_pending(&self, id: Uuid, pending: PendingAuthorization) -> AuthResult<()> {
        let mut sessions = self.sessions.write().await;
        if self.live(&mut sessions, id).is_none() {
            sessions.insert(id, SessionRecord::new(id));
        }
        if let Some(record) = sessions.get_mut(&id) {
            if record.pending.is_some() {
                tracing::debug!(session = %id, "Replacing outstanding pending authorization");
            }
            record.pending = Some(pending);
            record.touch();
        }
        Ok(())
    }

    async fn take_pending(&self, id: Uuid, state: &str) -> AuthResult<PendingLookup> {
        let mut sessions = self.sessions.write().await;
        let Some(record) = self.live(&mut sessions, id) else {
            return Ok(PendingLookup::Missing);
        };
        let Some(pending) = record.pending.as_ref() else {
            return Ok(PendingLookup::Missing);
        };
        if !constant_time_eq(pending.state.as_bytes(), state.as_bytes()) {
            return Ok(PendingLookup::StateMismatch);
        }

        record.touch();
        Ok(record
            .pending
            .take()
            .map_or(PendingLookup::Missing, PendingLookup::Found))
    }

    async fn put_authenticated(&self, session: AuthenticatedSession) -> AuthResult<()> {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .entry(session.session_id)
            .or_insert_with(|| SessionRecord::new(session.session_id));
        record.authenticated = Some(session);
        record.touch();
        Ok(())
    }

    async fn authenticated(&self, id: Uuid) -> AuthResult<Option<AuthenticatedSession>> {
        let mut sessions = self.sessions.write().await;
        Ok(self.live(&mut sessions, id).and_then(|record| {
            record.touch();
            record.authenticated.clone()
        }))
    }

    async fn remove(&self, id: Uuid) -> AuthResult<Option<SessionRecord>> {
        Ok(self.sessions.write().await.remove(&id))
    }

    async fn purge_expired(&self) -> AuthResult<usize> {
        let now = OffsetDateTime::now_utc();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, record| !record.is_idle(self.idle_timeout, now));
        Ok(before - sessions.len())
    }
}
