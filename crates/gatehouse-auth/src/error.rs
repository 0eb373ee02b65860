//! Error types for the relying party.
//!
//! Every failure of the login, callback, token and logout operations is an
//! [`AuthError`]. Errors are grouped into an [`ErrorCategory`] which decides
//! how the HTTP layer reacts: validation, provider and exchange failures send
//! the browser back to the landing page, internal failures render a generic
//! error page, configuration failures abort startup.

use thiserror::Error;

use crate::oidc::discovery::DiscoveryError;
use crate::oidc::jwks::JwksError;

/// Relying-party error.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Required configuration is missing or the provider metadata is unusable.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A callback arrived for a session with no outstanding login.
    #[error("No pending authorization for this session")]
    MissingPendingAuthorization,

    /// The callback `state` does not match the stored one.
    #[error("State parameter does not match the pending authorization")]
    StateMismatch,

    /// The provider returned an `error` on the callback.
    #[error("Authorization denied by provider: {error}")]
    ProviderDenied {
        error: String,
        description: Option<String>,
    },

    /// The callback carried neither `code` nor `error`.
    #[error("Authorization code missing from callback")]
    MissingCode,

    /// The ID token `nonce` does not match the stored one.
    #[error("ID token nonce does not match the pending authorization")]
    NonceMismatch,

    /// The ID token could not be decoded or failed a claim check.
    #[error("Invalid ID token: {message}")]
    IdTokenInvalid { message: String },

    /// The token endpoint rejected the request or could not be reached in time.
    #[error("Token exchange failed: {message}")]
    TokenExchange {
        message: String,
        status: Option<u16>,
        provider_error: Option<String>,
    },

    /// Non-success response from a provider endpoint other than the token endpoint.
    #[error("HTTP {status} from {context}")]
    Http {
        status: u16,
        body: String,
        context: String,
    },

    /// Transport failure talking to the provider.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The provider returned a body that could not be understood.
    #[error("Invalid response from provider: {message}")]
    InvalidResponse { message: String },

    /// Session store failure.
    #[error("Session error: {message}")]
    Session { message: String },
}

impl AuthError {
    /// Create a `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a `ProviderDenied` error.
    #[must_use]
    pub fn provider_denied(error: impl Into<String>, description: Option<String>) -> Self {
        Self::ProviderDenied {
            error: error.into(),
            description,
        }
    }

    /// Create an `IdTokenInvalid` error.
    #[must_use]
    pub fn id_token_invalid(message: impl Into<String>) -> Self {
        Self::IdTokenInvalid {
            message: message.into(),
        }
    }

    /// Create a `TokenExchange` error without HTTP context.
    #[must_use]
    pub fn token_exchange(message: impl Into<String>) -> Self {
        Self::TokenExchange {
            message: message.into(),
            status: None,
            provider_error: None,
        }
    }

    /// Create a `TokenExchange` error from a non-success token endpoint response.
    #[must_use]
    pub fn token_exchange_http(status: u16, provider_error: Option<String>, body: &str) -> Self {
        Self::TokenExchange {
            message: format!("HTTP {status} - {body}"),
            status: Some(status),
            provider_error,
        }
    }

    /// Create an `Http` error.
    #[must_use]
    pub fn http(status: u16, body: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Http {
            status,
            body: body.into(),
            context: context.into(),
        }
    }

    /// Map a failed outbound request to a provider endpoint.
    ///
    /// Timeouts are `TokenExchange` failures; anything else is `Network`.
    #[must_use]
    pub fn transport(err: reqwest::Error, endpoint: &str) -> Self {
        if err.is_timeout() {
            Self::token_exchange(format!("{endpoint} timed out: {err}"))
        } else {
            Self::Network(err)
        }
    }

    /// Create an `InvalidResponse` error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Create a `Session` error.
    #[must_use]
    pub fn session(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::MissingPendingAuthorization
            | Self::StateMismatch
            | Self::MissingCode
            | Self::NonceMismatch
            | Self::IdTokenInvalid { .. } => ErrorCategory::Validation,
            Self::ProviderDenied { .. } => ErrorCategory::Provider,
            Self::TokenExchange { .. } => ErrorCategory::Exchange,
            Self::Http { .. }
            | Self::Network(_)
            | Self::InvalidResponse { .. }
            | Self::Session { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns `true` if the user should be sent back to the landing page
    /// rather than shown an error page.
    #[must_use]
    pub fn is_redirectable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Validation | ErrorCategory::Provider | ErrorCategory::Exchange
        )
    }
}

impl From<DiscoveryError> for AuthError {
    fn from(err: DiscoveryError) -> Self {
        Self::configuration(format!("provider metadata unavailable: {err}"))
    }
}

impl From<JwksError> for AuthError {
    fn from(err: JwksError) -> Self {
        Self::id_token_invalid(format!("signing keys unavailable: {err}"))
    }
}

/// Error categories for routing errors to a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Startup configuration problems; fatal.
    Configuration,
    /// Callback failed a CSRF, replay or shape check.
    Validation,
    /// The identity provider refused the authorization.
    Provider,
    /// The code or credentials could not be exchanged for tokens.
    Exchange,
    /// Unexpected failures.
    Internal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Validation => write!(f, "validation"),
            Self::Provider => write!(f, "provider"),
            Self::Exchange => write!(f, "exchange"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
