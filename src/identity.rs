//! Server self-identification.
//!
//! The identity is the machine hostname plus the IPv4 addresses of its
//! non-loopback network interfaces. It is computed once at startup and
//! sent as the `X-Server` header on every response.

use std::net::IpAddr;

use axum::http::{HeaderName, HeaderValue};

pub static X_SERVER: HeaderName = HeaderName::from_static("x-server");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerIdentity {
    pub hostname: String,
    pub addrs: String,
}

impl ServerIdentity {
    #[must_use]
    pub fn new(hostname: impl Into<String>, addrs: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            addrs: addrs.into(),
        }
    }

    /// Read hostname and interface addresses. Never fails: unknown parts
    /// are reported as `unknown`.
    #[must_use]
    pub fn discover() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        let addrs = match if_addrs::get_if_addrs() {
            Ok(interfaces) => format_addrs(
                interfaces
                    .iter()
                    .filter(|iface| !iface.is_loopback())
                    .map(if_addrs::Interface::ip),
            ),
            Err(e) => {
                tracing::debug!(error = %e, "network interfaces unavailable");
                "unknown".to_string()
            }
        };

        Self { hostname, addrs }
    }

    /// `"<hostname> (<addrs>)"`.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.hostname, self.addrs)
    }

    /// `X-Server` value, or `None` when the name is not header-safe.
    #[must_use]
    pub fn header_value(&self) -> Option<HeaderValue> {
        HeaderValue::from_str(&self.display_name()).ok()
    }
}

/// Comma-separated, de-duplicated non-loopback IPv4 addresses.
fn format_addrs(ips: impl Iterator<Item = IpAddr>) -> String {
    let mut v4: Vec<String> = Vec::new();
    for ip in ips {
        if let IpAddr::V4(addr) = ip {
            let text = addr.to_string();
            if !addr.is_loopback() && !v4.contains(&text) {
                v4.push(text);
            }
        }
    }
    if v4.is_empty() {
        "unknown".to_string()
    } else {
        v4.join(",")
    }
}
