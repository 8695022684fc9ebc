//! Landing page and static assets.
//!
//! An assets directory holds `templates/index.html` and a `static/` tree.
//! The template is read once at startup; `GET /` fills its placeholders
//! (`{{backend_url}}`, `{{client_ip}}`, `{{server_name}}`,
//! `{{server_addrs}}`) with HTML-escaped values.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};

use crate::error::EdgeError;
use crate::proxy::headers::client_ip;
use crate::server::AppState;

#[derive(Debug, Clone)]
pub struct PageTemplate {
    source: String,
}

#[derive(Debug, Clone, Copy)]
pub struct PageData<'a> {
    pub backend_url: &'a str,
    pub client_ip: &'a str,
    pub server_name: &'a str,
    pub server_addrs: &'a str,
}

impl PageTemplate {
    #[must_use]
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    #[must_use]
    pub fn render(&self, data: &PageData<'_>) -> String {
        let mut out = self.source.clone();
        for (placeholder, value) in [
            ("{{backend_url}}", data.backend_url),
            ("{{client_ip}}", data.client_ip),
            ("{{server_name}}", data.server_name),
            ("{{server_addrs}}", data.server_addrs),
        ] {
            if out.contains(placeholder) {
                out = out.replace(placeholder, &escape_html(value));
            }
        }
        out
    }
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Loaded assets directory.
#[derive(Debug, Clone)]
pub struct Assets {
    dir: PathBuf,
    page: PageTemplate,
}

impl Assets {
    pub async fn load(dir: &Path) -> Result<Self, EdgeError> {
        let template_path = dir.join("templates").join("index.html");
        let source = tokio::fs::read_to_string(&template_path)
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EdgeError::TemplateNotFound {
                        path: template_path.clone(),
                    }
                } else {
                    EdgeError::Io(e)
                }
            })?;

        Ok(Self {
            dir: dir.to_path_buf(),
            page: PageTemplate::from_source(source),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn static_dir(&self) -> PathBuf {
        self.dir.join("static")
    }

    #[must_use]
    pub const fn page(&self) -> &PageTemplate {
        &self.page
    }
}

pub async fn index_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let Some(assets) = &state.assets else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let ip = client_ip(&headers, peer);
    let backend_url = state.relay.backend().map(url::Url::as_str).unwrap_or_default();
    let data = PageData {
        backend_url,
        client_ip: &ip,
        server_name: &state.identity.hostname,
        server_addrs: &state.identity.addrs,
    };

    (
        [(header::CACHE_CONTROL, "no-store")],
        Html(assets.page().render(&data)),
    )
        .into_response()
}
