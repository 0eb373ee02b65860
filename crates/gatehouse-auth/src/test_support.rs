//! Shared fixtures for unit tests: configuration and a wiremock-backed provider.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::json;
use time::OffsetDateTime;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

use crate::config::RelyingPartyConfig;
use crate::oidc::metadata::ProviderMetadata;
use crate::oidc::pkce::{PkceChallenge, PkceVerifier};
use crate::service::RelyingParty;
use crate::session::store::InMemorySessionStore;

pub(crate) const CLIENT_ID: &str = "test-client";

pub(crate) fn base_config(issuer: &str) -> RelyingPartyConfig {
    let mut config = RelyingPartyConfig::default();
    config.oidc.discovery_url = issuer.to_string();
    config.oidc.client_id = CLIENT_ID.to_string();
    config.oidc.client_secret = "test-secret".to_string();
    config.oidc.allow_http = true;
    config.cookie.secret = "test-cookie-secret".to_string();
    config
}

pub(crate) fn provider_metadata(issuer: &str) -> ProviderMetadata {
    serde_json::from_value(discovery_document(issuer)).unwrap()
}

fn discovery_document(issuer: &str) -> serde_json::Value {
    json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}/authorize"),
        "token_endpoint": format!("{issuer}/token"),
        "userinfo_endpoint": format!("{issuer}/userinfo"),
        "end_session_endpoint": format!("{issuer}/logout"),
        "jwks_uri": format!("{issuer}/jwks"),
        "response_types_supported": ["code"],
        "response_modes_supported": ["query", "fragment", "form_post"],
        "code_challenge_methods_supported": ["S256"],
        "token_endpoint_auth_methods_supported": ["client_secret_post", "client_secret_basic"]
    })
}

/// Sign ID token claims with the key published in `testdata/jwks.json`.
pub(crate) fn sign_id_token(claims: &serde_json::Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some("test-key".to_string());
    let key = EncodingKey::from_rsa_pem(include_bytes!("../testdata/id_token_signing_key.pem"))
        .unwrap();
    jsonwebtoken::encode(&header, claims, &key).unwrap()
}

/// Matches token requests whose `code_verifier` hashes to the challenge
/// sent in the authorization request.
pub(crate) struct VerifierMatchesChallenge(pub String);

impl Match for VerifierMatchesChallenge {
    fn matches(&self, request: &Request) -> bool {
        url::form_urlencoded::parse(&request.body)
            .find(|(key, _)| key == "code_verifier")
            .and_then(|(_, verifier)| PkceVerifier::new(verifier.into_owned()).ok())
            .is_some_and(|verifier| {
                PkceChallenge::from_verifier(&verifier).as_str() == self.0
            })
    }
}

pub(crate) enum TokenBehaviour {
    Success,
    /// Successful response carrying the given ID token.
    WithIdToken(String),
    Reject,
}

fn token_response(id_token: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": "access-abc",
        "token_type": "Bearer",
        "expires_in": 3600,
        "id_token": id_token,
        "scope": "openid email profile"
    }))
}

pub(crate) struct MockProvider {
    pub server: MockServer,
}

impl MockProvider {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let issuer = server.uri();

        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(discovery_document(&issuer)))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(include_str!("../testdata/jwks.json"), "application/json"),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sub": "user-123",
                "email": "ada@example.com",
                "name": "Ada Lovelace"
            })))
            .mount(&server)
            .await;

        Self { server }
    }

    pub fn relying_party(&self) -> RelyingParty {
        self.relying_party_with(|_| {})
    }

    pub fn relying_party_with(&self, configure: impl FnOnce(&mut RelyingPartyConfig)) -> RelyingParty {
        let mut config = base_config(&self.server.uri());
        configure(&mut config);
        RelyingParty::new(
            config,
            Arc::new(InMemorySessionStore::new(Duration::from_secs(3600))),
        )
        .unwrap()
    }

    /// Claims of a valid ID token for the mock user.
    pub fn id_token_claims(&self, nonce: &str) -> serde_json::Value {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        json!({
            "iss": self.server.uri(),
            "sub": "user-123",
            "aud": CLIENT_ID,
            "exp": now + 300,
            "iat": now,
            "nonce": nonce
        })
    }

    /// Expect one authorization code exchange whose verifier matches `challenge`.
    pub async fn expect_code_exchange(
        &self,
        code: &str,
        nonce: &str,
        challenge: &str,
        behaviour: TokenBehaviour,
    ) {
        let response = match behaviour {
            TokenBehaviour::Success => token_response(&sign_id_token(&self.id_token_claims(nonce))),
            TokenBehaviour::WithIdToken(id_token) => token_response(&id_token),
            TokenBehaviour::Reject => ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "The code has expired"
            })),
        };

        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains(format!("code={code}")))
            .and(VerifierMatchesChallenge(challenge.to_string()))
            .respond_with(response)
            .expect(1)
            .mount(&self.server)
            .await;
    }

    pub async fn expect_no_token_requests(&self) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&self.server)
            .await;
    }
}
