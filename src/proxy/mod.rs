//! Backend relay and aggregation core.
//!
//! - [`relay`] forwards requests under the relay prefix to the configured
//!   backend and streams the answer back.
//! - [`aggregate`] fans one request out to many concurrent backend calls and
//!   merges the results.
//! - [`executor`] performs single outbound calls for both.
//! - [`headers`] strips hop-by-hop headers and resolves the client address.

pub mod aggregate;
pub mod executor;
pub mod headers;
pub mod relay;

use axum::http::HeaderMap;

/// `X-Correlation-Id` from the request, or a fresh v4 UUID. Only used to tie
/// log lines of one request together; the inbound header itself is relayed
/// like any other.
#[must_use]
pub fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from)
}
