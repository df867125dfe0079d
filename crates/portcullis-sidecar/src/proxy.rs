//! HTTP proxy client for forwarding requests to the upstream service.

use std::time::Duration;

use bytes::Bytes;
use http::header::HeaderMap;
use http::{Method, StatusCode, Uri};
use reqwest::Client;

use crate::error::{SidecarError, SidecarResult};
use crate::headers::upstream_headers;

/// HTTP proxy client for forwarding requests to upstream.
#[derive(Debug, Clone)]
pub struct ProxyClient {
    client: Client,
    upstream_url: String,
    timeout: Duration,
}

impl ProxyClient {
    /// Create a new proxy client.
    ///
    /// Redirects are passed back to the caller rather than followed.
    pub fn new(upstream_url: impl Into<String>, timeout: Duration) -> SidecarResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(100)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| SidecarError::server(format!("failed to create upstream client: {e}")))?;

        Ok(Self {
            client,
            upstream_url: upstream_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Upstream URL for a request URI: the upstream base plus the original
    /// path and query.
    pub fn target_url(&self, uri: &Uri) -> String {
        let path_and_query = uri.path_and_query().map_or("/", |pq| pq.as_str());
        format!("{}{path_and_query}", self.upstream_url)
    }

    /// Forward a request to the upstream service.
    pub async fn forward(&self, request: ProxyRequest) -> SidecarResult<ProxyResponse> {
        let url = self.target_url(&request.uri);
        let headers = upstream_headers(&request.headers, &request.request_id);

        let response = self
            .client
            .request(request.method, &url)
            .headers(headers)
            .body(request.body)
            .send()
            .await
            .map_err(|e| self.map_error(&e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| self.map_error(&e))?;

        Ok(ProxyResponse {
            status,
            headers,
            body,
        })
    }

    fn map_error(&self, err: &reqwest::Error) -> SidecarError {
        if err.is_timeout() {
            SidecarError::UpstreamTimeout {
                timeout_ms: self.timeout.as_millis(),
            }
        } else {
            SidecarError::upstream(format!("request failed: {err}"))
        }
    }

    /// Get the upstream URL.
    pub fn upstream_url(&self) -> &str {
        &self.upstream_url
    }

    /// Get the timeout.
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Request to be forwarded to upstream.
#[derive(Debug)]
pub struct ProxyRequest {
    /// HTTP method.
    pub method: Method,
    /// Original request URI; only path and query are used.
    pub uri: Uri,
    /// Request headers as received.
    pub headers: HeaderMap,
    /// Buffered request body.
    pub body: Bytes,
    /// Request id attached as `x-request-id`.
    pub request_id: String,
}

impl ProxyRequest {
    /// Create a new proxy request.
    pub fn new(method: Method, uri: Uri, request_id: impl Into<String>) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            request_id: request_id.into(),
        }
    }

    /// Set the request headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Set the request body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// Response from upstream.
#[derive(Debug)]
pub struct ProxyResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
}
