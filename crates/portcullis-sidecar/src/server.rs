//! Sidecar HTTP server implementation.
//!
//! Every request outside `/_portcullis/` is buffered, authorized against the
//! live route index and, when allowed, forwarded to the upstream service.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use portcullis_authz::{
    Authorizer, Consistency, HttpClientConfig, HttpPermissionsClient, IndexHandle,
    RequestContext,
};
use portcullis_config::{ConsistencyMode, PortcullisConfig, ServerConfig};
use portcullis_core::SubjectExtractor;
use portcullis_telemetry::render_metrics;
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::error::{SidecarError, SidecarResult};
use crate::headers::{self, set_request_id};
use crate::health::HealthChecker;
use crate::proxy::{ProxyClient, ProxyRequest, ProxyResponse};

/// Path prefix of the sidecar's own endpoints.
pub const INTERNAL_PREFIX: &str = "/_portcullis/";

/// Request handling shared by all connections.
#[derive(Debug)]
pub struct SidecarService {
    authorizer: Authorizer,
    proxy: ProxyClient,
    health: Arc<HealthChecker>,
    max_body_bytes: usize,
}

impl SidecarService {
    /// Create a service from its parts.
    pub fn new(
        authorizer: Authorizer,
        proxy: ProxyClient,
        health: Arc<HealthChecker>,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            authorizer,
            proxy,
            health,
            max_body_bytes,
        }
    }

    /// Wire up the authorization client, subject extractor and upstream
    /// client described by `config`, reading routes from `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn from_config(
        config: &PortcullisConfig,
        index: IndexHandle,
        health: Arc<HealthChecker>,
    ) -> SidecarResult<Self> {
        let mut client_config =
            HttpClientConfig::new(config.authz.endpoint.as_str()).with_timeout(config.authz.timeout());
        if let Some(token) = &config.authz.bearer_token {
            client_config = client_config.with_bearer_token(token.as_str());
        }
        let client = HttpPermissionsClient::new(client_config)?;

        let extractor = SubjectExtractor::new(config.identity.to_identity_options());
        if !extractor.verifies_signature() {
            warn!("bearer token signatures are not verified; only use behind a trusted gateway");
        }

        let authorizer = Authorizer::new(index, Arc::new(client), extractor)
            .with_subject_type(config.authz.subject_type.as_str())
            .with_consistency(consistency(config.authz.consistency));

        let proxy = ProxyClient::new(
            config.server.upstream_url.as_str(),
            config.server.upstream_timeout(),
        )?;

        Ok(Self::new(
            authorizer,
            proxy,
            health,
            config.server.max_body_bytes,
        ))
    }

    /// The authorizer in use.
    pub fn authorizer(&self) -> &Authorizer {
        &self.authorizer
    }

    /// Handle one request.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let start = Instant::now();
        let request_id = headers::request_id(req.headers());
        let span = info_span!(
            "request",
            request_id = %request_id,
            method = %req.method(),
            path = %req.uri().path(),
        );

        async move {
            let response = self.dispatch(req, &request_id).await;
            info!(
                status = response.status().as_u16(),
                duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                "request completed"
            );
            response
        }
        .instrument(span)
        .await
    }

    async fn dispatch<B>(&self, req: Request<B>, request_id: &str) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        if req.uri().path().starts_with(INTERNAL_PREFIX) {
            return self.internal(req.uri().path(), request_id);
        }

        let ctx = match self.buffer(req).await {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(error = %e, "rejecting request body");
                return error_response(&e, request_id);
            }
        };

        let verdict = self.authorizer.authorize(&ctx).await;
        if let Some(envelope) = verdict.to_envelope(Some(request_id)) {
            return json_response(verdict.status_code(), &envelope, request_id);
        }

        let (method, uri, headers, body) = ctx.into_parts();
        let request = ProxyRequest::new(method, uri, request_id)
            .with_headers(headers)
            .with_body(body);

        match self.proxy.forward(request).await {
            Ok(response) => upstream_response(response, request_id),
            Err(e) => {
                error!(error = %e, upstream = self.proxy.upstream_url(), "proxy error");
                error_response(&e, request_id)
            }
        }
    }

    /// Reads the whole body, refusing anything over the configured limit.
    async fn buffer<B>(&self, req: Request<B>) -> SidecarResult<RequestContext>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let declared = req
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > self.max_body_bytes) {
            return Err(self.too_large());
        }

        let (parts, body) = req.into_parts();
        let body = Limited::new(body, self.max_body_bytes)
            .collect()
            .await
            .map_err(|e| {
                if e.is::<LengthLimitError>() {
                    self.too_large()
                } else {
                    SidecarError::body_read(e.to_string())
                }
            })?
            .to_bytes();

        Ok(RequestContext::new(
            parts.method,
            parts.uri,
            parts.headers,
            body,
        ))
    }

    const fn too_large(&self) -> SidecarError {
        SidecarError::PayloadTooLarge {
            limit: self.max_body_bytes,
        }
    }

    fn internal(&self, path: &str, request_id: &str) -> Response<Full<Bytes>> {
        match path.trim_start_matches(INTERNAL_PREFIX) {
            "health" => json_response(StatusCode::OK, &self.health.liveness(), request_id),
            "ready" => {
                let readiness = self.health.readiness();
                let status = if readiness.status.is_ready() {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                };
                json_response(status, &readiness, request_id)
            }
            "metrics" => match render_metrics() {
                Some(text) => text_response(StatusCode::OK, text, request_id),
                None => error_response(
                    &SidecarError::NotFound {
                        path: path.to_string(),
                    },
                    request_id,
                ),
            },
            "version" => json_response(
                StatusCode::OK,
                &serde_json::json!({
                    "name": env!("CARGO_PKG_NAME"),
                    "version": crate::VERSION,
                }),
                request_id,
            ),
            _ => error_response(
                &SidecarError::NotFound {
                    path: path.to_string(),
                },
                request_id,
            ),
        }
    }
}

/// Maps the configured consistency onto the check request setting.
pub const fn consistency(mode: ConsistencyMode) -> Consistency {
    match mode {
        ConsistencyMode::MinimizeLatency => Consistency::MinimizeLatency,
        ConsistencyMode::FullyConsistent => Consistency::FullyConsistent,
    }
}

/// Sidecar server.
#[derive(Debug)]
pub struct SidecarServer {
    addr: SocketAddr,
    shutdown_timeout: Duration,
    service: Arc<SidecarService>,
}

impl SidecarServer {
    /// Create a new sidecar server.
    ///
    /// # Errors
    ///
    /// Returns an error if `server.http_addr` is not a socket address.
    pub fn new(config: &ServerConfig, service: SidecarService) -> SidecarResult<Self> {
        let addr = config
            .http_addr
            .parse()
            .map_err(|e| SidecarError::server(format!("invalid listen address: {e}")))?;

        Ok(Self {
            addr,
            shutdown_timeout: config.shutdown_timeout(),
            service: Arc::new(service),
        })
    }

    /// Run until Ctrl-C or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn run(self) -> SidecarResult<()> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| SidecarError::server(format!("failed to bind {}: {e}", self.addr)))?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve connections from `listener` until `shutdown` completes, then
    /// give open connections up to the shutdown timeout to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener address cannot be read.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> SidecarResult<()>
    where
        F: Future<Output = ()> + Send,
    {
        info!(addr = %listener.local_addr()?, "portcullis sidecar listening");

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let service = Arc::clone(&self.service);
                        connections.spawn(serve_connection(stream, peer, service, stop_rx.clone()));
                    }
                    Err(e) => error!(error = %e, "failed to accept connection"),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                () = &mut shutdown => {
                    info!("shutdown signal received, stopping server");
                    break;
                }
            }
        }

        drop(listener);
        // Receivers only observe the change; a send error means none are left.
        let _ = stop_tx.send(true);

        let active = connections.len();
        info!(active, timeout = ?self.shutdown_timeout, "waiting for connections to close");
        let drained = tokio::time::timeout(self.shutdown_timeout, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = connections.len(),
                "shutdown timeout reached, closing remaining connections"
            );
            connections.abort_all();
        }

        info!("server stopped");
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    service: Arc<SidecarService>,
    mut stop: watch::Receiver<bool>,
) {
    let io = TokioIo::new(stream);
    let svc = service_fn(move |req: Request<Incoming>| {
        let service = Arc::clone(&service);
        async move { Ok::<_, Infallible>(service.handle(req).await) }
    });

    let conn = http1::Builder::new().serve_connection(io, svc);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => {
            if let Err(e) = result {
                debug!(peer = %peer, error = %e, "connection error");
            }
        }
        _ = stop.changed() => {
            conn.as_mut().graceful_shutdown();
            if let Err(e) = conn.as_mut().await {
                debug!(peer = %peer, error = %e, "connection error during shutdown");
            }
        }
    }
}

/// Completes on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl-C"),
        () = terminate => info!("received SIGTERM"),
    }
}

fn upstream_response(upstream: ProxyResponse, request_id: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(upstream.body));
    *response.status_mut() = upstream.status;
    *response.headers_mut() = headers::downstream_headers(&upstream.headers, request_id);
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: &T, request_id: &str) -> Response<Full<Bytes>> {
    let json = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    set_request_id(response.headers_mut(), request_id);
    response
}

fn text_response(status: StatusCode, body: String, request_id: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    set_request_id(response.headers_mut(), request_id);
    response
}

fn error_response(err: &SidecarError, request_id: &str) -> Response<Full<Bytes>> {
    json_response(err.status_code(), &err.to_envelope(Some(request_id)), request_id)
}
