//! Calls to APIs protected by the provider's access tokens.

use serde::{Deserialize, Serialize};

use super::token::TokenSet;
use crate::AuthResult;
use crate::error::AuthError;
use crate::service::RelyingParty;

/// HTTP method for a resource call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl ResourceMethod {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A request to a protected API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResourceRequest {
    pub url: String,

    #[serde(default)]
    pub method: ResourceMethod,

    /// JSON body, sent with `Content-Type: application/json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// Send `request` with `access_token` as bearer and return the JSON response.
///
/// An empty response body yields `Value::Null`.
///
/// # Errors
///
/// `Http` for a non-success status, `TokenExchange` on timeout, `Network`
/// for other transport failures, `InvalidResponse` for a body that is not JSON.
pub async fn call_resource(
    http_client: &reqwest::Client,
    request: &ResourceRequest,
    access_token: &str,
) -> AuthResult<serde_json::Value> {
    let mut builder = http_client
        .request(request.method.as_reqwest(), &request.url)
        .bearer_auth(access_token)
        .header("Accept", "application/json");
    if let Some(body) = &request.body {
        builder = builder.json(body);
    }

    let response = builder
        .send()
        .await
        .map_err(|e| AuthError::transport(e, "resource endpoint"))?;

    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| AuthError::transport(e, "resource endpoint"))?;

    if !status.is_success() {
        tracing::warn!(status = status.as_u16(), url = %request.url, "Resource request failed");
        return Err(AuthError::http(
            status.as_u16(),
            String::from_utf8_lossy(&body),
            request.url.clone(),
        ));
    }

    if body.is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_slice(&body)
        .map_err(|e| AuthError::invalid_response(format!("resource response is not JSON: {e}")))
}

impl RelyingParty {
    /// Call a protected API with the access token from `tokens`.
    ///
    /// # Errors
    ///
    /// `TokenExchange` if the access token has already expired, otherwise
    /// as [`call_resource`].
    pub async fn call_resource(
        &self,
        request: &ResourceRequest,
        tokens: &TokenSet,
    ) -> AuthResult<serde_json::Value> {
        if tokens.is_expired() {
            return Err(AuthError::token_exchange("access token has expired"));
        }
        call_resource(&self.http_client, request, &tokens.access_token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockProvider;
    use serde_json::json;
    use time::OffsetDateTime;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tokens(expires_at: i64) -> TokenSet {
        TokenSet {
            access_token: "machine-token".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: 3600,
            expires_at,
            refresh_token: None,
            id_token: None,
            scope: None,
        }
    }

    #[tokio::test]
    async fn test_post_json_with_bearer() {
        let provider = MockProvider::start().await;
        Mock::given(method("POST"))
            .and(path("/bookings/check"))
            .and(header("authorization", "Bearer machine-token"))
            .and(body_json(json!({"datetime": "2026-03-01T12:00:00Z"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"available": true})))
            .expect(1)
            .mount(&provider.server)
            .await;

        let request = ResourceRequest {
            url: format!("{}/bookings/check", provider.server.uri()),
            method: ResourceMethod::Post,
            body: Some(json!({"datetime": "2026-03-01T12:00:00Z"})),
        };
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let response = provider
            .relying_party()
            .call_resource(&request, &tokens(now + 600))
            .await
            .unwrap();
        assert_eq!(response["available"], true);
    }

    #[tokio::test]
    async fn test_error_status_keeps_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("insufficient_scope"))
            .mount(&server)
            .await;

        let request = ResourceRequest {
            url: format!("{}/api", server.uri()),
            method: ResourceMethod::Get,
            body: None,
        };
        let err = call_resource(&reqwest::Client::new(), &request, "t")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::Http { status: 403, ref body, .. } if body == "insufficient_scope"
        ));
    }

    #[tokio::test]
    async fn test_empty_body_is_null() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let request = ResourceRequest {
            url: format!("{}/api/1", server.uri()),
            method: ResourceMethod::Delete,
            body: None,
        };
        let value = call_resource(&reqwest::Client::new(), &request, "t")
            .await
            .unwrap();
        assert!(value.is_null());
    }

    #[tokio::test]
    async fn test_expired_token_is_not_sent() {
        let provider = MockProvider::start().await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&provider.server)
            .await;

        let request = ResourceRequest {
            url: format!("{}/api", provider.server.uri()),
            method: ResourceMethod::Get,
            body: None,
        };
        let err = provider
            .relying_party()
            .call_resource(&request, &tokens(0))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenExchange { .. }));
    }

    #[test]
    fn test_method_names() {
        let method: ResourceMethod = serde_json::from_str("\"POST\"").unwrap();
        assert_eq!(method, ResourceMethod::Post);
        assert_eq!(ResourceMethod::default().as_reqwest(), reqwest::Method::GET);
    }
}
