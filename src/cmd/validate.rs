//! `edge-relay validate`: load a config file the way `run` would and
//! report the outcome as text or JSON.

use serde_json::json;

use crate::cli::{ValidateArgs, ValidateFormat};
use crate::config::model::Config;
use crate::config::sources::file_source::FileSource;
use crate::config::validation;
use crate::error::{EdgeError, ValidationError};

pub async fn execute(args: &ValidateArgs) -> Result<(), EdgeError> {
    let source = FileSource::new(args.config.clone());
    let shown = source.path().display().to_string();

    match source.load().await {
        Ok(config) => {
            report_valid(&shown, &config, &args.format);
            Ok(())
        }
        Err(EdgeError::ConfigValidation { errors }) => {
            report_invalid(&shown, &errors, &args.format);
            Err(EdgeError::ConfigValidation { errors })
        }
        Err(e) => Err(e),
    }
}

fn report_valid(shown: &str, config: &Config, format: &ValidateFormat) {
    match format {
        ValidateFormat::Text => {
            println!("\u{2713} {}", validation::format_validation_report(shown, config));
        }
        ValidateFormat::Json => println!("{}", summary_json(config)),
    }
}

fn report_invalid(shown: &str, errors: &[ValidationError], format: &ValidateFormat) {
    match format {
        ValidateFormat::Text => {
            eprintln!("\u{2717} {shown}: {} problem(s)\n", errors.len());
            for error in errors {
                eprintln!("{error}");
            }
        }
        ValidateFormat::Json => println!("{}", errors_json(errors)),
    }
}

fn summary_json(config: &Config) -> serde_json::Value {
    json!({
        "valid": true,
        "relay": {
            "backend_url": config.relay.backend_url(),
            "prefix": config.relay.prefix,
            "timeout_ms": config.relay.timeout,
        },
        "aggregator": {
            "endpoint": config.aggregator.endpoint,
            "max_concurrency": config.aggregator.max_concurrency,
            "failure_policy": config.aggregator.failure_policy,
            "buckets": config.aggregator.buckets(),
        },
    })
}

fn errors_json(errors: &[ValidationError]) -> serde_json::Value {
    let problems: Vec<_> = errors
        .iter()
        .map(|e| {
            json!({
                "at": format!("{}.{}", e.section, e.field),
                "message": e.message,
                "suggestion": e.suggestion,
            })
        })
        .collect();
    json!({ "valid": false, "errors": problems })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_lists_buckets() {
        let summary = summary_json(&Config::default());
        assert_eq!(summary["valid"], true);
        assert_eq!(summary["relay"]["prefix"], "/api/");
        assert_eq!(summary["aggregator"]["failure_policy"], "open");
        assert_eq!(
            summary["aggregator"]["buckets"],
            json!(["backend1_count", "backend2_count"])
        );
    }

    #[test]
    fn errors_are_keyed_by_location() {
        let mut config = Config::default();
        config.aggregator.max_concurrency = 0;
        let errors = validation::validate(&config).unwrap_err();

        let report = errors_json(&errors);
        assert_eq!(report["valid"], false);
        assert_eq!(report["errors"][0]["at"], "aggregator.max_concurrency");
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let args = ValidateArgs {
            config: "does-not-exist.yaml".into(),
            format: ValidateFormat::Json,
        };
        let err = execute(&args).await.unwrap_err();
        assert!(matches!(err, EdgeError::ConfigFileNotFound { .. }));
    }
}
