//! Authorization callback validation and code exchange.
//!
//! # Flow
//!
//! ```text
//! handle_callback(session, params)
//!     ├─► no pending authorization     → MissingPendingAuthorization
//!     ├─► state differs                → StateMismatch (pending kept)
//!     ├─► pending older than its TTL   → MissingPendingAuthorization
//!     ├─► error=...                    → ProviderDenied
//!     ├─► no code                      → MissingCode
//!     ├─► POST token endpoint          → TokenExchange on non-2xx / timeout
//!     ├─► id_token signature (JWKS or client secret)
//!     ├─► id_token nonce/iss/aud/exp   → NonceMismatch / IdTokenInvalid
//!     ├─► GET userinfo (bearer)
//!     └─► store AuthenticatedSession under a fresh session id
//! ```
//!
//! Every failure short-circuits. Nothing is retried: the code is single use.

use jsonwebtoken::{Algorithm, DecodingKey, Header};
use serde::Deserialize;
use time::OffsetDateTime;
use url::Url;
use uuid::Uuid;

use super::id_token::{self, IdTokenClaims, IdTokenExpectations};
use super::identity::{UserIdentity, fetch_userinfo};
use super::metadata::ProviderMetadata;
use super::token::{ClientAuth, TokenSet, request_token};
use crate::AuthResult;
use crate::error::AuthError;
use crate::service::RelyingParty;
use crate::session::store::PendingLookup;
use crate::session::types::{AuthenticatedSession, PendingAuthorization};

/// Parameters the provider sends to the redirect URI.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,

    #[serde(default)]
    pub state: Option<String>,

    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub error_description: Option<String>,

    /// RFC 9207 issuer identifier, when the provider sends one.
    #[serde(default)]
    pub iss: Option<String>,
}

impl CallbackParams {
    /// No authorization response parameters at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code.is_none() && self.state.is_none() && self.error.is_none()
    }
}

impl RelyingParty {
    /// Validate a callback for `session_id`, exchange the code and record the login.
    ///
    /// # Errors
    ///
    /// See the module documentation for the order of checks and their errors.
    pub async fn handle_callback(
        &self,
        session_id: Uuid,
        params: CallbackParams,
    ) -> AuthResult<AuthenticatedSession> {
        let state = params.state.as_deref().unwrap_or_default();
        let pending = match self.store.take_pending(session_id, state).await? {
            PendingLookup::Found(pending) => pending,
            PendingLookup::Missing => return Err(AuthError::MissingPendingAuthorization),
            PendingLookup::StateMismatch => return Err(AuthError::StateMismatch),
        };

        let now = OffsetDateTime::now_utc();
        if pending.is_stale_at(now) {
            tracing::debug!(session = %session_id, "Pending authorization expired");
            return Err(AuthError::MissingPendingAuthorization);
        }

        if let Some(error) = params.error {
            return Err(AuthError::provider_denied(error, params.error_description));
        }

        let code = params
            .code
            .filter(|c| !c.is_empty())
            .ok_or(AuthError::MissingCode)?;

        let metadata = self.fetch_metadata().await?;
        if let Some(iss) = params.iss.as_deref()
            && self.config.oidc.validate_issuer
            && iss.trim_end_matches('/') != metadata.issuer.trim_end_matches('/')
        {
            return Err(AuthError::id_token_invalid(format!(
                "callback iss {iss} does not match provider issuer"
            )));
        }

        let tokens = self.exchange_code(&metadata, &pending, &code).await?;
        let id_claims = self.verify_id_token(&metadata, &pending, &tokens).await?;
        let identity = self
            .resolve_identity(&metadata, &tokens, id_claims.as_ref())
            .await?;

        // The pre-login id is known to the browser before authentication;
        // the authenticated session gets a fresh one.
        self.store.remove(session_id).await?;
        let session = AuthenticatedSession {
            session_id: Uuid::new_v4(),
            tokens,
            identity,
            authenticated_at: OffsetDateTime::now_utc(),
        };
        self.store.put_authenticated(session.clone()).await?;

        tracing::info!(
            session = %session.session_id,
            previous_session = %session_id,
            subject = %session.identity.subject,
            expires_at = session.tokens.expires_at,
            "User authenticated"
        );

        Ok(session)
    }

    async fn exchange_code(
        &self,
        metadata: &ProviderMetadata,
        pending: &PendingAuthorization,
        code: &str,
    ) -> AuthResult<TokenSet> {
        let oidc = &self.config.oidc;
        if !metadata.supports_auth_method(oidc.token_auth_method) {
            tracing::warn!(
                method = oidc.token_auth_method.as_str(),
                "Provider does not advertise the configured token endpoint auth method"
            );
        }
        let client = ClientAuth {
            client_id: &oidc.client_id,
            client_secret: &oidc.client_secret,
            method: oidc.token_auth_method,
        };
        let grant = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", pending.redirect_uri.as_str()),
            ("code_verifier", pending.code_verifier.as_str()),
        ];

        request_token(&self.http_client, &metadata.token_endpoint, client, &grant).await
    }

    async fn verify_id_token(
        &self,
        metadata: &ProviderMetadata,
        pending: &PendingAuthorization,
        tokens: &TokenSet,
    ) -> AuthResult<Option<IdTokenClaims>> {
        let Some(raw) = tokens.id_token.as_deref() else {
            tracing::warn!("Token response has no id_token; nonce cannot be verified");
            return Ok(None);
        };

        let header = id_token::decode_header(raw)?;
        let keys = self.id_token_keys(metadata, &header).await?;

        let oidc = &self.config.oidc;
        let expected = IdTokenExpectations {
            issuer: oidc.validate_issuer.then_some(metadata.issuer.as_str()),
            client_id: &oidc.client_id,
            nonce: pending.nonce.as_deref(),
            leeway: oidc.clock_skew_leeway,
        };

        id_token::verify(raw, &keys, &expected).map(Some)
    }

    /// Candidate keys for the token's algorithm: the client secret for
    /// `HS*`, otherwise the provider's published keys.
    async fn id_token_keys(
        &self,
        metadata: &ProviderMetadata,
        header: &Header,
    ) -> AuthResult<Vec<(DecodingKey, Algorithm)>> {
        if id_token::is_symmetric(header.alg) {
            let secret = self.config.oidc.client_secret.as_bytes();
            return Ok(vec![(DecodingKey::from_secret(secret), header.alg)]);
        }

        let jwks_uri = metadata
            .jwks_uri
            .as_deref()
            .ok_or_else(|| AuthError::id_token_invalid("provider publishes no jwks_uri"))?;
        let jwks_uri = Url::parse(jwks_uri)
            .map_err(|e| AuthError::configuration(format!("invalid jwks_uri: {e}")))?;

        let keys = match header.kid.as_deref() {
            Some(kid) => vec![self.jwks.get_key(&jwks_uri, kid).await?],
            None => self.jwks.signing_keys(&jwks_uri).await?,
        };

        // Prefer the algorithm the key declares, fall back to the header
        Ok(keys
            .into_iter()
            .map(|(key, alg)| (key, alg.unwrap_or(header.alg)))
            .collect())
    }

    async fn resolve_identity(
        &self,
        metadata: &ProviderMetadata,
        tokens: &TokenSet,
        id_claims: Option<&IdTokenClaims>,
    ) -> AuthResult<UserIdentity> {
        match (metadata.userinfo_endpoint.as_deref(), id_claims) {
            (Some(endpoint), claims) => {
                let identity =
                    fetch_userinfo(&self.http_client, endpoint, &tokens.access_token).await?;
                // OIDC Core 5.3.2: userinfo sub must equal the ID token sub
                if let Some(claims) = claims
                    && claims.sub != identity.subject
                {
                    return Err(AuthError::id_token_invalid(
                        "userinfo subject does not match ID token subject",
                    ));
                }
                Ok(identity)
            }
            (None, Some(claims)) => Ok(UserIdentity::from_id_token(claims)),
            (None, None) => Err(AuthError::invalid_response(
                "provider returned neither an id_token nor a userinfo endpoint",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::store::SessionStore;
    use crate::test_support::{MockProvider, TokenBehaviour, sign_id_token};
    use std::collections::HashMap;
    use url::Url;

    fn query_map(url: &Url) -> HashMap<String, String> {
        url.query_pairs().into_owned().collect()
    }

    async fn start_login(rp: &RelyingParty, session: Uuid) -> HashMap<String, String> {
        query_map(&rp.begin_login(session).await.unwrap())
    }

    #[tokio::test]
    async fn test_full_round_trip() {
        let provider = MockProvider::start().await;
        let rp = provider.relying_party();
        let session = Uuid::new_v4();

        let query = start_login(&rp, session).await;
        provider
            .expect_code_exchange(
                "the-code",
                &query["nonce"],
                &query["code_challenge"],
                TokenBehaviour::Success,
            )
            .await;

        let authenticated = rp
            .handle_callback(
                session,
                CallbackParams {
                    code: Some("the-code".to_string()),
                    state: Some(query["state"].clone()),
                    ..CallbackParams::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(authenticated.identity.subject, "user-123");
        assert_eq!(authenticated.identity.email.as_deref(), Some("ada@example.com"));
        assert_eq!(authenticated.tokens.access_token, "access-abc");
        assert!(!authenticated.tokens.is_expired());

        // The authenticated session lives under a fresh id
        assert_ne!(authenticated.session_id, session);
        assert!(rp.session(authenticated.session_id).await.unwrap().is_some());
        assert!(rp.session(session).await.unwrap().is_none());

        // The pending authorization was consumed
        let replay = rp
            .handle_callback(
                session,
                CallbackParams {
                    code: Some("the-code".to_string()),
                    state: Some(query["state"].clone()),
                    ..CallbackParams::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(replay, AuthError::MissingPendingAuthorization));
    }

    #[tokio::test]
    async fn test_state_mismatch_makes_no_token_request() {
        let provider = MockProvider::start().await;
        provider.expect_no_token_requests().await;
        let rp = provider.relying_party();
        let session = Uuid::new_v4();
        start_login(&rp, session).await;

        let err = rp
            .handle_callback(
                session,
                CallbackParams {
                    code: Some("the-code".to_string()),
                    state: Some("forged".to_string()),
                    ..CallbackParams::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::StateMismatch));
        assert!(rp.session(session).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_pending_authorization() {
        let provider = MockProvider::start().await;
        provider.expect_no_token_requests().await;
        let rp = provider.relying_party();

        let err = rp
            .handle_callback(
                Uuid::new_v4(),
                CallbackParams {
                    code: Some("c".to_string()),
                    state: Some("s".to_string()),
                    ..CallbackParams::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingPendingAuthorization));
    }

    #[tokio::test]
    async fn test_provider_denied() {
        let provider = MockProvider::start().await;
        provider.expect_no_token_requests().await;
        let rp = provider.relying_party();
        let session = Uuid::new_v4();
        let query = start_login(&rp, session).await;

        let err = rp
            .handle_callback(
                session,
                CallbackParams {
                    state: Some(query["state"].clone()),
                    error: Some("access_denied".to_string()),
                    error_description: Some("user cancelled".to_string()),
                    ..CallbackParams::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::ProviderDenied { ref error, .. } if error == "access_denied"
        ));
        assert!(rp.session(session).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_code() {
        let provider = MockProvider::start().await;
        provider.expect_no_token_requests().await;
        let rp = provider.relying_party();
        let session = Uuid::new_v4();
        let query = start_login(&rp, session).await;

        let err = rp
            .handle_callback(
                session,
                CallbackParams {
                    state: Some(query["state"].clone()),
                    ..CallbackParams::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingCode));
    }

    #[tokio::test]
    async fn test_token_endpoint_rejection() {
        let provider = MockProvider::start().await;
        let rp = provider.relying_party();
        let session = Uuid::new_v4();
        let query = start_login(&rp, session).await;
        provider
            .expect_code_exchange(
                "the-code",
                &query["nonce"],
                &query["code_challenge"],
                TokenBehaviour::Reject,
            )
            .await;

        let err = rp
            .handle_callback(
                session,
                CallbackParams {
                    code: Some("the-code".to_string()),
                    state: Some(query["state"].clone()),
                    ..CallbackParams::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenExchange { status: Some(400), .. }));
        assert!(rp.session(session).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_nonce_mismatch_rejected() {
        let provider = MockProvider::start().await;
        let rp = provider.relying_party();
        let session = Uuid::new_v4();
        let query = start_login(&rp, session).await;
        provider
            .expect_code_exchange(
                "the-code",
                "some-other-nonce",
                &query["code_challenge"],
                TokenBehaviour::Success,
            )
            .await;

        let err = rp
            .handle_callback(
                session,
                CallbackParams {
                    code: Some("the-code".to_string()),
                    state: Some(query["state"].clone()),
                    ..CallbackParams::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NonceMismatch));
        assert!(rp.session(session).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_callback_issuer_mismatch() {
        let provider = MockProvider::start().await;
        provider.expect_no_token_requests().await;
        let rp = provider.relying_party();
        let session = Uuid::new_v4();
        let query = start_login(&rp, session).await;

        let err = rp
            .handle_callback(
                session,
                CallbackParams {
                    code: Some("the-code".to_string()),
                    state: Some(query["state"].clone()),
                    iss: Some("https://mix-up.example.com".to_string()),
                    ..CallbackParams::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::IdTokenInvalid { .. }));
    }

    #[tokio::test]
    async fn test_pending_consumed_after_failed_exchange() {
        let provider = MockProvider::start().await;
        let rp = provider.relying_party();
        let session = Uuid::new_v4();
        let query = start_login(&rp, session).await;
        provider
            .expect_code_exchange(
                "the-code",
                &query["nonce"],
                &query["code_challenge"],
                TokenBehaviour::Reject,
            )
            .await;

        let params = CallbackParams {
            code: Some("the-code".to_string()),
            state: Some(query["state"].clone()),
            ..CallbackParams::default()
        };
        assert!(rp.handle_callback(session, params.clone()).await.is_err());
        assert!(matches!(
            rp.store().take_pending(session, &query["state"]).await.unwrap(),
            PendingLookup::Missing
        ));
    }

    async fn callback_with_id_token(
        provider: &MockProvider,
        rp: &RelyingParty,
        id_token: impl FnOnce(&str) -> String,
    ) -> AuthResult<AuthenticatedSession> {
        let session = Uuid::new_v4();
        let query = start_login(rp, session).await;
        provider
            .expect_code_exchange(
                "the-code",
                &query["nonce"],
                &query["code_challenge"],
                TokenBehaviour::WithIdToken(id_token(&query["nonce"])),
            )
            .await;

        rp.handle_callback(
            session,
            CallbackParams {
                code: Some("the-code".to_string()),
                state: Some(query["state"].clone()),
                ..CallbackParams::default()
            },
        )
        .await
    }

    #[tokio::test]
    async fn test_unsigned_id_token_rejected() {
        use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

        let provider = MockProvider::start().await;
        let rp = provider.relying_party();

        let err = callback_with_id_token(&provider, &rp, |nonce| {
            let mut claims = provider.id_token_claims(nonce);
            claims["sub"] = serde_json::json!("admin");
            format!(
                "{}.{}.garbage",
                URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#),
                URL_SAFE_NO_PAD.encode(claims.to_string())
            )
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::IdTokenInvalid { .. }));
        assert!(err.is_redirectable());
    }

    #[tokio::test]
    async fn test_id_token_with_forged_signature_rejected() {
        let provider = MockProvider::start().await;
        let rp = provider.relying_party();

        let err = callback_with_id_token(&provider, &rp, |nonce| {
            let token = sign_id_token(&provider.id_token_claims(nonce));
            let (signed, _) = token.rsplit_once('.').unwrap();
            format!("{signed}.c2lnbmF0dXJl")
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::IdTokenInvalid { .. }));
    }

    #[tokio::test]
    async fn test_id_token_with_unknown_key_rejected() {
        let provider = MockProvider::start().await;
        let rp = provider.relying_party();

        let err = callback_with_id_token(&provider, &rp, |nonce| {
            let mut header = Header::new(Algorithm::RS256);
            header.kid = Some("retired-key".to_string());
            let key = jsonwebtoken::EncodingKey::from_rsa_pem(include_bytes!(
                "../../testdata/id_token_signing_key.pem"
            ))
            .unwrap();
            jsonwebtoken::encode(&header, &provider.id_token_claims(nonce), &key).unwrap()
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("retired-key"));
    }

    #[tokio::test]
    async fn test_id_token_signed_with_client_secret() {
        let provider = MockProvider::start().await;
        let rp = provider.relying_party();

        let authenticated = callback_with_id_token(&provider, &rp, |nonce| {
            jsonwebtoken::encode(
                &Header::new(Algorithm::HS256),
                &provider.id_token_claims(nonce),
                &jsonwebtoken::EncodingKey::from_secret(b"test-secret"),
            )
            .unwrap()
        })
        .await
        .unwrap();
        assert_eq!(authenticated.identity.subject, "user-123");
    }

    #[tokio::test]
    async fn test_userinfo_timeout_sends_user_back() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, ResponseTemplate};

        let provider = MockProvider::start().await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"sub": "user-123"}))
                    .set_delay(std::time::Duration::from_millis(1500)),
            )
            .with_priority(1)
            .mount(&provider.server)
            .await;
        let rp = provider.relying_party_with(|config| {
            config.oidc.request_timeout = std::time::Duration::from_millis(500);
        });

        let session = Uuid::new_v4();
        let query = start_login(&rp, session).await;
        provider
            .expect_code_exchange(
                "the-code",
                &query["nonce"],
                &query["code_challenge"],
                TokenBehaviour::Success,
            )
            .await;

        let err = rp
            .handle_callback(
                session,
                CallbackParams {
                    code: Some("the-code".to_string()),
                    state: Some(query["state"].clone()),
                    ..CallbackParams::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenExchange { .. }));
        assert!(err.is_redirectable());
        assert!(rp.session(session).await.unwrap().is_none());
    }
}
