//! ID token verification.
//!
//! The signature is checked with `jsonwebtoken` against either the
//! provider's published keys (asymmetric algorithms) or the client secret
//! (`HS*`, OIDC Core 10.1). `iss`, `aud` and `exp` are enforced through
//! [`Validation`]; `nonce` and `azp` are checked on the decoded claims.

use std::collections::HashMap;
use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation};
use serde::{Deserialize, Deserializer, Serialize};

use super::pkce::constant_time_eq;
use crate::error::AuthError;

/// Standard OIDC ID token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,

    pub sub: String,

    /// Audience; a single string or an array on the wire.
    #[serde(deserialize_with = "deserialize_audience")]
    pub aud: Vec<String>,

    pub exp: i64,

    #[serde(default)]
    pub iat: Option<i64>,

    #[serde(default)]
    pub nonce: Option<String>,

    #[serde(default)]
    pub azp: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub email_verified: Option<bool>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub given_name: Option<String>,

    #[serde(default)]
    pub family_name: Option<String>,

    #[serde(default)]
    pub preferred_username: Option<String>,

    #[serde(default)]
    pub picture: Option<String>,

    #[serde(default)]
    pub locale: Option<String>,

    /// Claims not defined above.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn deserialize_audience<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => Ok(vec![s]),
        OneOrMany::Many(v) => Ok(v),
    }
}

/// What the ID token must assert.
#[derive(Debug, Clone)]
pub struct IdTokenExpectations<'a> {
    /// Expected `iss`; `None` skips the check.
    pub issuer: Option<&'a str>,
    pub client_id: &'a str,
    /// Nonce sent with the authorization request; `None` if none was sent.
    pub nonce: Option<&'a str>,
    pub leeway: Duration,
}

/// Read the JOSE header without verifying anything.
///
/// # Errors
///
/// Returns `IdTokenInvalid` if the token is not a compact JWS or names an
/// unsupported algorithm (including `none`).
pub fn decode_header(id_token: &str) -> Result<Header, AuthError> {
    jsonwebtoken::decode_header(id_token)
        .map_err(|e| AuthError::id_token_invalid(format!("unreadable header: {e}")))
}

/// Whether `alg` is an HMAC algorithm keyed with the client secret.
#[must_use]
pub fn is_symmetric(alg: Algorithm) -> bool {
    matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

fn validation(alg: Algorithm, expected: &IdTokenExpectations<'_>) -> Validation {
    let mut validation = Validation::new(alg);
    validation.set_audience(&[expected.client_id]);
    if let Some(issuer) = expected.issuer {
        let issuer = issuer.trim_end_matches('/');
        validation.set_issuer(&[issuer.to_string(), format!("{issuer}/")]);
        validation.set_required_spec_claims(&["exp", "aud", "iss", "sub"]);
    } else {
        validation.set_required_spec_claims(&["exp", "aud", "sub"]);
    }
    validation.leeway = expected.leeway.as_secs();
    validation
}

fn claim_error(err: &jsonwebtoken::errors::Error) -> AuthError {
    let message = match err.kind() {
        ErrorKind::ExpiredSignature => "token expired".to_string(),
        ErrorKind::InvalidIssuer => "issuer mismatch".to_string(),
        ErrorKind::InvalidAudience => "audience does not include client_id".to_string(),
        ErrorKind::MissingRequiredClaim(claim) => format!("missing required claim {claim}"),
        _ => err.to_string(),
    };
    AuthError::id_token_invalid(message)
}

/// Verify the signature and claims of `id_token`.
///
/// Each candidate key is tried in turn with its algorithm; a signature or
/// algorithm mismatch moves on to the next key, any claim failure is final.
///
/// # Errors
///
/// `IdTokenInvalid` if no key verifies the signature or a claim check
/// fails, `NonceMismatch` if the nonce differs from the expected one.
pub fn verify(
    id_token: &str,
    keys: &[(DecodingKey, Algorithm)],
    expected: &IdTokenExpectations<'_>,
) -> Result<IdTokenClaims, AuthError> {
    let header = decode_header(id_token)?;

    let mut verified = None;
    for (key, alg) in keys {
        if *alg != header.alg {
            continue;
        }
        match jsonwebtoken::decode::<IdTokenClaims>(id_token, key, &validation(*alg, expected)) {
            Ok(data) => {
                verified = Some(data.claims);
                break;
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm
                ) => {}
            Err(e) => return Err(claim_error(&e)),
        }
    }
    let claims = verified
        .ok_or_else(|| AuthError::id_token_invalid("signature does not verify"))?;

    if let Some(nonce) = expected.nonce {
        match claims.nonce.as_deref() {
            Some(actual) if constant_time_eq(actual.as_bytes(), nonce.as_bytes()) => {}
            _ => return Err(AuthError::NonceMismatch),
        }
    }

    if claims.aud.len() > 1
        && let Some(azp) = &claims.azp
        && azp != expected.client_id
    {
        return Err(AuthError::id_token_invalid("azp does not match client_id"));
    }

    Ok(claims)
}
