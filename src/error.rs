//! Unified error types for edge-relay.
//!
//! [`EdgeError`] covers startup and CLI failures (config loading, binding,
//! health probes). [`ProxyError`] covers request-path failures in the relay
//! and the aggregator and knows how to render itself as a plain-text HTTP
//! response. [`ValidationError`] describes one config validation problem.

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub section: String,
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "  {}.{}: {}", self.section, self.field, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " ({suggestion})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EdgeError {
    #[error("Config file not found: {}", path.display())]
    ConfigFileNotFound { path: PathBuf },

    #[error("Config parse error in {path}:\n  {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Config validation failed:\n{}", format_errors(.errors))]
    ConfigValidation { errors: Vec<ValidationError> },

    #[error("Unsupported config format: '{0}'")]
    UnsupportedFormat(String),

    #[error("Template not found: {} (looked for templates/index.html)", path.display())]
    TemplateNotFound { path: PathBuf },

    #[error("Invalid address: {0}")]
    AddressParse(#[from] std::net::AddrParseError),

    #[error("Invalid URI: {source}")]
    UriParse {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("HTTP request failed: {source}")]
    HttpRequest {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("Health check failed with status {0}")]
    HealthCheckFailed(hyper::StatusCode),
}

/// Request-path failures. Each variant maps to one HTTP status and a short
/// plain-text body; the detailed cause is only logged.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("backend not configured")]
    BackendNotConfigured,

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("bad backend url: {0}")]
    BadBackendUrl(String),

    #[error("failed to create request: {0}")]
    RequestConstructionFailed(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("{0}")]
    InvalidParameter(String),

    #[error("decode failure: {0}")]
    DecodeFailure(String),

    #[error("aggregation incomplete: {failed} of {attempted} calls failed")]
    AggregationIncomplete { failed: usize, attempted: usize },
}

impl ProxyError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BackendNotConfigured
            | Self::BackendUnavailable(_)
            | Self::DecodeFailure(_)
            | Self::AggregationIncomplete { .. } => StatusCode::BAD_GATEWAY,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::BadBackendUrl(_) | Self::RequestConstructionFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::InvalidParameter(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Body sent to the client. Never includes the underlying cause.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::BackendNotConfigured => "backend not configured".into(),
            Self::MethodNotAllowed => "method not allowed".into(),
            Self::BadBackendUrl(_) => "bad backend url".into(),
            Self::RequestConstructionFailed(_) => "failed create request".into(),
            Self::BackendUnavailable(_) => "backend unavailable".into(),
            Self::DecodeFailure(_) => "bad backend response".into(),
            Self::InvalidParameter(msg) => msg.clone(),
            Self::AggregationIncomplete { .. } => self.to_string(),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), self.public_message()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_match_error_kinds() {
        assert_eq!(
            ProxyError::BackendNotConfigured.status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ProxyError::MethodNotAllowed.status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            ProxyError::BadBackendUrl("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ProxyError::InvalidParameter("count parameter is required".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn public_message_hides_cause() {
        let err = ProxyError::BackendUnavailable("connection refused (os error 111)".into());
        assert_eq!(err.public_message(), "backend unavailable");
    }

    #[test]
    fn incomplete_aggregation_reports_counts() {
        let err = ProxyError::AggregationIncomplete {
            failed: 2,
            attempted: 5,
        };
        assert_eq!(
            err.public_message(),
            "aggregation incomplete: 2 of 5 calls failed"
        );
    }

    #[test]
    fn validation_error_display_includes_suggestion() {
        let err = ValidationError {
            section: "relay".into(),
            field: "prefix".into(),
            message: "must end with '/'".into(),
            suggestion: Some("did you mean '/api/'?".into()),
        };
        assert_eq!(
            err.to_string(),
            "  relay.prefix: must end with '/' (did you mean '/api/'?)"
        );
    }
}
