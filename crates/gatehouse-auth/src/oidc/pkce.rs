//! PKCE, state and nonce generation.
//!
//! Implements RFC 7636 with the S256 method only; "plain" is refused. Every
//! random value comes from the operating system CSPRNG.
//!
//! # Example
//!
//! ```
//! use gatehouse_auth::oidc::pkce::{PkceChallenge, PkceVerifier};
//!
//! let verifier = PkceVerifier::generate();
//! let challenge = PkceChallenge::from_verifier(&verifier);
//! assert!(challenge.verify(&verifier).is_ok());
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Random bytes behind every verifier, state and nonce (256 bits).
const RANDOM_BYTES: usize = 32;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during PKCE operations.
#[derive(Debug, thiserror::Error)]
pub enum PkceError {
    /// Verifier length is outside the valid range (43-128 characters).
    #[error("Invalid verifier length: must be 43-128 characters, got {0}")]
    InvalidVerifierLength(usize),

    /// Verifier contains invalid characters.
    #[error("Invalid verifier characters: must be unreserved ([A-Za-z0-9-._~])")]
    InvalidVerifierCharacters,

    /// Verifier doesn't match challenge.
    #[error("PKCE verification failed: verifier does not match challenge")]
    VerificationFailed,
}

// =============================================================================
// PKCE Challenge Method
// =============================================================================

/// PKCE challenge method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PkceChallengeMethod {
    /// SHA-256 hash (the only supported method).
    #[default]
    S256,
}

impl PkceChallengeMethod {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S256 => "S256",
        }
    }
}

impl std::fmt::Display for PkceChallengeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// PKCE Verifier
// =============================================================================

/// PKCE code verifier.
///
/// A high-entropy random string over the unreserved characters
/// `[A-Z] / [a-z] / [0-9] / "-" / "." / "_" / "~"`, 43 to 128 characters long.
#[derive(Debug, Clone)]
pub struct PkceVerifier(String);

impl PkceVerifier {
    /// Create a verifier from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the length is not 43-128 or the string contains
    /// characters other than `[A-Za-z0-9-._~]`.
    pub fn new(verifier: String) -> Result<Self, PkceError> {
        let len = verifier.len();

        if !(43..=128).contains(&len) {
            return Err(PkceError::InvalidVerifierLength(len));
        }

        if !verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '~')
        {
            return Err(PkceError::InvalidVerifierCharacters);
        }

        Ok(Self(verifier))
    }

    /// Generate a verifier from 32 random bytes (43 base64url characters).
    #[must_use]
    pub fn generate() -> Self {
        Self(random_token())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for PkceVerifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// PKCE Challenge
// =============================================================================

/// PKCE code challenge: `BASE64URL(SHA256(ASCII(code_verifier)))`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge(String);

impl PkceChallenge {
    /// Derive the S256 challenge for a verifier.
    #[must_use]
    pub fn from_verifier(verifier: &PkceVerifier) -> Self {
        Self(derive_challenge(verifier.as_str()))
    }

    /// Verify that a verifier matches this challenge.
    ///
    /// # Errors
    ///
    /// Returns `PkceError::VerificationFailed` if the verifier doesn't match.
    pub fn verify(&self, verifier: &PkceVerifier) -> Result<(), PkceError> {
        let expected = derive_challenge(verifier.as_str());
        if constant_time_eq(self.0.as_bytes(), expected.as_bytes()) {
            Ok(())
        } else {
            Err(PkceError::VerificationFailed)
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for PkceChallenge {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Free Functions
// =============================================================================

/// Generate a fresh code verifier string.
#[must_use]
pub fn generate_verifier() -> String {
    PkceVerifier::generate().into_inner()
}

/// S256 challenge for a verifier string. Deterministic.
#[must_use]
pub fn derive_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generate an ID token nonce.
#[must_use]
pub fn generate_nonce() -> String {
    random_token()
}

/// Generate an authorization request `state`.
#[must_use]
pub fn generate_state() -> String {
    random_token()
}

/// 256 bits from the OS CSPRNG, base64url without padding.
fn random_token() -> String {
    let mut bytes = [0u8; RANDOM_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Byte comparison whose running time does not depend on where inputs differ.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// =============================================================================
// Tests
// =============================================================================
