//! `edge-relay health`: probe `GET /healthz` on a running instance.

use std::time::{Duration, Instant};

use http_body_util::BodyExt;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::cli::HealthArgs;
use crate::error::EdgeError;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn execute(args: HealthArgs) -> Result<(), EdgeError> {
    let url = healthz_url(&args.url);
    let uri: hyper::Uri = url
        .parse()
        .map_err(|e: hyper::http::uri::InvalidUri| EdgeError::UriParse {
            source: Box::new(e),
        })?;

    let connector = hyper_util::client::legacy::connect::HttpConnector::new();
    let client = Client::builder(TokioExecutor::new()).build(connector);

    let req = hyper::Request::builder()
        .uri(uri)
        .body(http_body_util::Full::new(bytes::Bytes::new()))
        .map_err(|e| EdgeError::HttpRequest {
            source: Box::new(e),
        })?;

    let started = Instant::now();
    let response = tokio::time::timeout(PROBE_TIMEOUT, client.request(req))
        .await
        .map_err(|_| EdgeError::HttpRequest {
            source: "health check timed out after 10s".into(),
        })?
        .map_err(|e| EdgeError::HttpRequest {
            source: Box::new(e),
        })?;

    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| EdgeError::HttpRequest {
            source: Box::new(e),
        })?
        .to_bytes();
    let elapsed = started.elapsed();

    if !status.is_success() {
        return Err(EdgeError::HealthCheckFailed(status));
    }

    let body = String::from_utf8_lossy(&body);
    if args.json {
        println!(
            "{}",
            serde_json::json!({
                "url": url,
                "status": status.as_u16(),
                "body": body.trim(),
                "latency_ms": elapsed.as_millis(),
            })
        );
    } else {
        println!(
            "\u{2713} edge-relay is healthy ({}) answered {:?} in {} ms",
            args.url,
            body.trim(),
            elapsed.as_millis()
        );
    }

    Ok(())
}

fn healthz_url(base: &str) -> String {
    format!("{}/healthz", base.trim_end_matches('/'))
}
