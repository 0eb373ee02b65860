//! Identity provider metadata.
//!
//! Data structures for the provider configuration document described by
//! [OpenID Connect Discovery 1.0](https://openid.net/specs/openid-connect-discovery-1_0.html).
//! Unknown members are ignored so providers can extend the document freely.

use serde::{Deserialize, Serialize};

use crate::config::{ClientAuthMethod, ResponseMode};

/// Provider configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    // ----- Required Fields -----
    /// Issuer identifier asserted by the provider.
    pub issuer: String,

    /// Authorization endpoint.
    pub authorization_endpoint: String,

    /// Token endpoint.
    pub token_endpoint: String,

    // ----- Recommended Fields -----
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,

    /// RP-initiated logout endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes_supported: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_types_supported: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_modes_supported: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grant_types_supported: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subject_types_supported: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub id_token_signing_alg_values_supported: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub token_endpoint_auth_methods_supported: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub token_endpoint_auth_signing_alg_values_supported: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code_challenge_methods_supported: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub claims_supported: Vec<String>,

    // ----- Optional Flags -----
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims_parameter_supported: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_parameter_supported: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_uri_parameter_supported: Option<bool>,
}

impl ProviderMetadata {
    /// Whether the provider advertises S256 PKCE.
    ///
    /// An empty list means the provider did not say; S256 is still sent.
    #[must_use]
    pub fn supports_pkce_s256(&self) -> bool {
        self.code_challenge_methods_supported.is_empty()
            || self
                .code_challenge_methods_supported
                .iter()
                .any(|m| m == "S256")
    }

    /// Whether the provider advertises the given response mode.
    ///
    /// Providers that omit the list support `query` and `fragment` by default.
    #[must_use]
    pub fn supports_response_mode(&self, mode: ResponseMode) -> bool {
        if self.response_modes_supported.is_empty() {
            return matches!(mode, ResponseMode::Query | ResponseMode::Fragment);
        }
        self.response_modes_supported
            .iter()
            .any(|m| m == mode.as_str())
    }

    /// Whether the token endpoint accepts the given client authentication.
    ///
    /// The Discovery default when omitted is `client_secret_basic`.
    #[must_use]
    pub fn supports_auth_method(&self, method: ClientAuthMethod) -> bool {
        if self.token_endpoint_auth_methods_supported.is_empty() {
            return method == ClientAuthMethod::ClientSecretBasic;
        }
        self.token_endpoint_auth_methods_supported
            .iter()
            .any(|m| m == method.as_str())
    }
}
