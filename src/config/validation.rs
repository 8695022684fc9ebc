//! Configuration validation with detailed error reporting.
//!
//! The [`validate`] function checks a parsed [`Config`] for problems such as
//! unparseable backend URLs, malformed relay prefixes, zero concurrency and
//! counter bucket names that would clash with fields of the aggregated
//! response. Every problem is reported, not just the first.

use url::Url;

use super::model::Config;
use crate::error::ValidationError;

/// Keys of the aggregated response that a counter bucket may not shadow.
pub const RESERVED_RESPONSE_KEYS: &[&str] =
    &["responses", "count_by_source", "failed", "total_time"];

/// Validate a backend URL. Returns `Ok(())` or a human-readable error.
pub fn validate_backend_url(url: &str) -> Result<(), String> {
    match Url::parse(url) {
        Ok(parsed) => {
            let scheme = parsed.scheme();
            if scheme != "http" && scheme != "https" {
                Err(format!(
                    "unsupported scheme '{scheme}' (expected http or https)"
                ))
            } else if parsed.host_str().is_none() {
                Err(format!("'{url}' has no host"))
            } else {
                Ok(())
            }
        }
        Err(_) => Err(format!("'{url}' is not a valid URL")),
    }
}

/// Validate the relay prefix. Returns `Ok(())` or a human-readable error.
pub fn validate_prefix(prefix: &str) -> Result<(), String> {
    if !prefix.starts_with('/') {
        return Err("prefix must start with '/'".into());
    }
    if !prefix.ends_with('/') {
        return Err("prefix must end with '/'".into());
    }
    if prefix == "/" {
        return Err("prefix cannot be '/' (it would shadow every other route)".into());
    }
    Ok(())
}

pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(url) = config.relay.backend_url() {
        if let Err(msg) = validate_backend_url(url) {
            errors.push(ValidationError {
                section: "relay".into(),
                field: "backend_url".into(),
                message: msg,
                suggestion: None,
            });
        }
    }

    if let Err(msg) = validate_prefix(&config.relay.prefix) {
        let trimmed = config.relay.prefix.trim_matches('/');
        let suggestion = (!trimmed.is_empty()).then(|| format!("did you mean '/{trimmed}/'?"));
        errors.push(ValidationError {
            section: "relay".into(),
            field: "prefix".into(),
            message: msg,
            suggestion,
        });
    }

    if config.relay.timeout == 0 {
        errors.push(ValidationError {
            section: "relay".into(),
            field: "timeout".into(),
            message: "timeout must be greater than 0".into(),
            suggestion: None,
        });
    }

    let aggregator = &config.aggregator;

    if let Err(msg) = validate_backend_url(&aggregator.endpoint) {
        errors.push(ValidationError {
            section: "aggregator".into(),
            field: "endpoint".into(),
            message: msg,
            suggestion: None,
        });
    }

    if aggregator.max_concurrency == 0 {
        errors.push(ValidationError {
            section: "aggregator".into(),
            field: "max_concurrency".into(),
            message: "max_concurrency must be at least 1".into(),
            suggestion: None,
        });
    }

    if aggregator.max_count == 0 {
        errors.push(ValidationError {
            section: "aggregator".into(),
            field: "max_count".into(),
            message: "max_count must be at least 1".into(),
            suggestion: None,
        });
    }

    for (field, value) in [
        ("call_timeout", aggregator.call_timeout),
        ("deadline", aggregator.deadline),
    ] {
        if value == Some(0) {
            errors.push(ValidationError {
                section: "aggregator".into(),
                field: field.into(),
                message: format!("{field} must be greater than 0"),
                suggestion: Some("omit it to disable".into()),
            });
        }
    }

    for (hostname, bucket) in &aggregator.identities {
        if hostname.is_empty() {
            errors.push(ValidationError {
                section: "aggregator".into(),
                field: "identities".into(),
                message: "identity hostname cannot be empty".into(),
                suggestion: None,
            });
        }
        if bucket.is_empty() {
            errors.push(ValidationError {
                section: "aggregator".into(),
                field: format!("identities.{hostname}"),
                message: "bucket name cannot be empty".into(),
                suggestion: None,
            });
        } else if RESERVED_RESPONSE_KEYS.contains(&bucket.as_str()) {
            errors.push(ValidationError {
                section: "aggregator".into(),
                field: format!("identities.{hostname}"),
                message: format!("bucket name '{bucket}' is reserved"),
                suggestion: Some(format!("did you mean '{bucket}_count'?")),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[must_use]
pub fn format_validation_report(path: &str, config: &Config) -> String {
    let relay = &config.relay;
    let aggregator = &config.aggregator;

    let mut lines = vec![String::new()];
    lines.push(format!(
        "  relay       {}*  -> {}",
        relay.prefix,
        relay.backend_url().unwrap_or("(not configured)")
    ));
    lines.push(format!("    timeout: {}ms", relay.timeout));
    lines.push(format!("  aggregate   -> {}", aggregator.endpoint));
    lines.push(format!(
        "    concurrency: {} (max count {})",
        aggregator.max_concurrency, aggregator.max_count
    ));
    lines.push(format!(
        "    failure policy: {:?}",
        aggregator.failure_policy
    ));
    for (hostname, bucket) in &aggregator.identities {
        lines.push(format!("    {hostname} => {bucket}"));
    }

    format!("{} is valid\n{}", path, lines.join("\n"))
}
