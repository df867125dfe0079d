//! HTTP client for the SpiceDB permissions API.
//!
//! Calls `POST {endpoint}/v1/permissions/check` with a bearer token, the
//! JSON form of the gRPC `CheckPermission` call.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::client::{CheckPermissionRequest, Permissionship, PermissionsClient};
use crate::error::{AuthzError, AuthzResult};

/// Path of the check endpoint.
pub const CHECK_PATH: &str = "/v1/permissions/check";

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings for [`HttpPermissionsClient`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL, e.g. `http://spicedb:8443`.
    pub endpoint: String,
    /// Preshared key sent as `Authorization: Bearer ...`.
    pub bearer_token: Option<String>,
    /// Per-call timeout.
    pub timeout: Duration,
}

impl HttpClientConfig {
    /// Creates settings for `endpoint` with the default timeout.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            bearer_token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Deserialize)]
struct CheckPermissionResponse {
    permissionship: Permissionship,
}

/// [`PermissionsClient`] over the SpiceDB HTTP gateway.
#[derive(Debug, Clone)]
pub struct HttpPermissionsClient {
    client: Client,
    check_url: String,
    bearer_token: Option<String>,
}

impl HttpPermissionsClient {
    /// Builds a client.
    pub fn new(config: HttpClientConfig) -> AuthzResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AuthzError::Config(e.to_string()))?;
        let check_url = format!("{}{CHECK_PATH}", config.endpoint.trim_end_matches('/'));
        Ok(Self {
            client,
            check_url,
            bearer_token: config.bearer_token,
        })
    }

    /// Full URL of the check endpoint.
    pub fn check_url(&self) -> &str {
        &self.check_url
    }
}

#[async_trait]
impl PermissionsClient for HttpPermissionsClient {
    async fn check_permission(&self, request: CheckPermissionRequest) -> AuthzResult<Permissionship> {
        let mut builder = self.client.post(&self.check_url).json(&request);
        if let Some(token) = &self.bearer_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AuthzError::UpstreamStatus {
                status: status.as_u16(),
                message,
            });
        }

        let body: CheckPermissionResponse = response
            .json()
            .await
            .map_err(|e| AuthzError::InvalidResponse(e.to_string()))?;
        debug!(
            resource_type = %request.resource.object_type,
            resource_id = %request.resource.object_id,
            permission = %request.permission,
            permissionship = body.permissionship.as_str(),
            "permission checked"
        );
        Ok(body.permissionship)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ObjectReference;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CheckPermissionRequest {
        CheckPermissionRequest::new(
            ObjectReference::new("provider", "AAR"),
            "view",
            ObjectReference::new("user", "123"),
        )
    }

    async fn client_for(server: &MockServer) -> HttpPermissionsClient {
        HttpPermissionsClient::new(
            HttpClientConfig::new(format!("{}/", server.uri())).with_bearer_token("psk"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_granted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CHECK_PATH))
            .and(header("authorization", "Bearer psk"))
            .and(body_json(json!({
                "resource": {"objectType": "provider", "objectId": "AAR"},
                "permission": "view",
                "subject": {"object": {"objectType": "user", "objectId": "123"}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "checkedAt": {"token": "GhUKEzE2"},
                "permissionship": "PERMISSIONSHIP_HAS_PERMISSION"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert_eq!(
            client.check_permission(request()).await.unwrap(),
            Permissionship::HasPermission
        );
    }

    #[tokio::test]
    async fn test_denied() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CHECK_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "permissionship": "PERMISSIONSHIP_NO_PERMISSION"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let result = client.check_permission(request()).await.unwrap();
        assert!(!result.is_granted());
    }

    #[tokio::test]
    async fn test_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.check_permission(request()).await.unwrap_err();
        assert!(matches!(err, AuthzError::UpstreamStatus { status: 503, .. }));
        assert!(err.is_upstream());
    }

    #[tokio::test]
    async fn test_unknown_permissionship_denies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"permissionship": "MAYBE"})))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let answer = client.check_permission(request()).await.unwrap();
        assert_eq!(answer, Permissionship::Unrecognized);
        assert!(!answer.is_granted());
    }

    #[tokio::test]
    async fn test_unreadable_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"permissionship": 7})))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.check_permission(request()).await.unwrap_err();
        assert!(matches!(err, AuthzError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_unreachable() {
        let client = HttpPermissionsClient::new(
            HttpClientConfig::new("http://127.0.0.1:9").with_timeout(Duration::from_millis(500)),
        )
        .unwrap();
        assert_eq!(client.check_url(), "http://127.0.0.1:9/v1/permissions/check");

        let err = client.check_permission(request()).await.unwrap_err();
        assert!(err.is_upstream());
    }
}
