//! Header sanitation and client address resolution for the relay.
//!
//! [`copy_sanitized`] copies inbound request headers onto an outbound
//! request minus the hop-by-hop set. Backend response headers are never run
//! through it: the relay hands them back to the client verbatim.

use std::net::SocketAddr;
use std::sync::LazyLock;

use http::header::{
    CONNECTION, HOST, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, TE, TRANSFER_ENCODING, UPGRADE,
};
use http::{HeaderMap, HeaderName, HeaderValue};

pub static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

static HOP_BY_HOP: LazyLock<Vec<HeaderName>> = LazyLock::new(|| {
    vec![
        CONNECTION,
        HeaderName::from_static("keep-alive"),
        PROXY_AUTHENTICATE,
        PROXY_AUTHORIZATION,
        TE,
        HeaderName::from_static("trailers"),
        TRANSFER_ENCODING,
        UPGRADE,
    ]
});

/// `HeaderName` is always lowercase, so equality is case-insensitive.
#[must_use]
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(name)
}

/// Append every non hop-by-hop header of `from` to `to`, keeping all values
/// of multi-valued headers.
pub fn copy_sanitized(from: &HeaderMap, to: &mut HeaderMap) {
    for (name, value) in from {
        if !is_hop_by_hop(name) {
            to.append(name.clone(), value.clone());
        }
    }
}

/// First entry of `X-Forwarded-For` when present, otherwise the peer IP.
#[must_use]
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get(&X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map_or_else(
            || peer.ip().to_string(),
            |xff| xff.split(',').next().unwrap_or_default().trim().to_string(),
        )
}

/// Build the header set sent to the backend: sanitized inbound headers,
/// `Host` pointing at the backend and `X-Forwarded-For` set to the client.
#[must_use]
pub fn build_outbound_headers(
    inbound: &HeaderMap,
    backend_authority: &str,
    client_ip: &str,
) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len() + 1);
    copy_sanitized(inbound, &mut headers);

    match HeaderValue::from_str(backend_authority) {
        Ok(val) => {
            headers.insert(HOST, val);
        }
        Err(_) => {
            headers.remove(HOST);
        }
    }

    match HeaderValue::from_str(client_ip) {
        Ok(val) => {
            headers.insert(X_FORWARDED_FOR.clone(), val);
        }
        Err(_) => {
            tracing::warn!(client_ip = %client_ip, "client address is not a valid header value");
            headers.remove(&X_FORWARDED_FOR);
        }
    }

    headers
}
