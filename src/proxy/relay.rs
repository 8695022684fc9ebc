//! Reverse-proxy relay: one inbound request under the relay prefix, one
//! backend call, response streamed straight back.
//!
//! [`RelayTarget`] turns the configured backend base URL plus the inbound
//! path remainder into the backend URI. [`Relay::forward`] assembles the
//! outbound request (sanitized headers, streamed body) and converts the
//! backend response without buffering it. Dropping the inbound request
//! future, as hyper does when the client disconnects, drops the backend call.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use url::Url;

use super::executor::{DeadlineBody, Executor};
use super::headers::{build_outbound_headers, client_ip};
use crate::config::model::RelayConfig;
use crate::error::{EdgeError, ProxyError};
use crate::server::AppState;

pub const RELAY_METHODS: &[Method] = &[Method::GET, Method::POST, Method::PUT, Method::DELETE];

/// Backend location for one relayed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayTarget {
    pub scheme: String,
    /// `host[:port]`, IPv6 hosts bracketed.
    pub authority: String,
    pub path: String,
    pub query: Option<String>,
}

impl RelayTarget {
    /// Join `remainder` onto the base URL path. Empty and `.` segments are
    /// dropped; `..` removes a remainder segment but never a base segment.
    #[must_use]
    pub fn resolve(base: &Url, remainder: &str, query: Option<&str>) -> Self {
        let base_segments: Vec<&str> = base
            .path()
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .collect();
        let floor = base_segments.len();
        let mut segments = base_segments;

        for segment in remainder.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.len() > floor {
                        segments.pop();
                    }
                }
                other => segments.push(other),
            }
        }

        let authority = match (base.host_str(), base.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        };

        Self {
            scheme: base.scheme().to_string(),
            authority,
            path: format!("/{}", segments.join("/")),
            query: query.map(str::to_string),
        }
    }

    pub fn to_uri(&self) -> Result<Uri, ProxyError> {
        if self.authority.is_empty() {
            return Err(ProxyError::BadBackendUrl("backend URL has no host".into()));
        }
        let mut target = format!("{}://{}{}", self.scheme, self.authority, self.path);
        if let Some(query) = &self.query {
            target.push('?');
            target.push_str(query);
        }
        target
            .parse::<Uri>()
            .map_err(|e| ProxyError::BadBackendUrl(format!("{target}: {e}")))
    }
}

pub struct Relay {
    backend: Option<Url>,
    prefix: String,
    timeout: Duration,
    executor: Executor,
}

impl Relay {
    pub fn new(config: &RelayConfig, executor: Executor) -> Result<Self, EdgeError> {
        let backend = config
            .backend_url()
            .map(Url::parse)
            .transpose()
            .map_err(|e| EdgeError::UriParse {
                source: Box::new(e),
            })?;

        Ok(Self {
            backend,
            prefix: config.prefix.clone(),
            timeout: config.timeout(),
            executor,
        })
    }

    #[must_use]
    pub fn backend(&self) -> Option<&Url> {
        self.backend.as_ref()
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Path remainder after the relay prefix, or `None` when `path` is not
    /// under the prefix.
    #[must_use]
    pub fn strip_prefix<'a>(&self, path: &'a str) -> Option<&'a str> {
        path.strip_prefix(self.prefix.as_str())
    }

    /// Location to redirect to when `uri` names the prefix without its
    /// trailing slash (`/api` → `/api/`), query kept.
    #[must_use]
    pub fn prefix_redirect(&self, uri: &Uri) -> Option<String> {
        let bare = self.prefix.strip_suffix('/')?;
        (uri.path() == bare).then(|| match uri.query() {
            Some(query) => format!("{}?{query}", self.prefix),
            None => self.prefix.clone(),
        })
    }

    pub async fn forward(&self, request: Request, peer: SocketAddr) -> Result<Response, ProxyError> {
        let backend = self.backend.as_ref().ok_or(ProxyError::BackendNotConfigured)?;

        if !RELAY_METHODS.contains(request.method()) {
            return Err(ProxyError::MethodNotAllowed);
        }

        let remainder = self.strip_prefix(request.uri().path()).unwrap_or_default();
        let target = RelayTarget::resolve(backend, remainder, request.uri().query());
        let uri = target.to_uri()?;

        let (parts, body) = request.into_parts();
        let ip = client_ip(&parts.headers, peer);
        let headers = build_outbound_headers(&parts.headers, &target.authority, &ip);

        let mut outbound = hyper::Request::builder()
            .method(parts.method)
            .uri(uri)
            .body(body)
            .map_err(|e| ProxyError::RequestConstructionFailed(e.to_string()))?;
        *outbound.headers_mut() = headers;

        // One budget for the whole call: response head and body.
        let deadline = tokio::time::Instant::now() + self.timeout;
        let response = self.executor.send(outbound, Some(self.timeout)).await?;

        // Backend headers pass through untouched, hop-by-hop ones included.
        let (head, incoming) = response.into_parts();
        let body = DeadlineBody::new(incoming, deadline, self.timeout);
        let mut relayed = Response::new(Body::new(body));
        *relayed.status_mut() = head.status;
        *relayed.headers_mut() = head.headers;
        Ok(relayed)
    }
}

/// Axum fallback: every request that no explicit route claimed. Requests
/// under the relay prefix are forwarded, anything else is a 404.
pub async fn relay_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let path = request.uri().path().to_string();
    if state.relay.strip_prefix(&path).is_none() {
        if let Some(location) = state.relay.prefix_redirect(request.uri()) {
            return (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response();
        }
        return StatusCode::NOT_FOUND.into_response();
    }

    let correlation_id = super::correlation_id(request.headers());
    let method = request.method().clone();
    let start = Instant::now();

    match state.relay.forward(request, peer).await {
        Ok(response) => {
            tracing::info!(
                correlation_id = %correlation_id,
                method = %method,
                path = %path,
                status = response.status().as_u16(),
                latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                "relayed"
            );
            response
        }
        Err(e) => {
            tracing::warn!(
                correlation_id = %correlation_id,
                method = %method,
                path = %path,
                error = %e,
                "relay failed"
            );
            e.into_response()
        }
    }
}
