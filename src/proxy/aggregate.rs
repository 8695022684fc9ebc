//! Concurrent aggregator: fan one inbound request out to `count` calls
//! against the aggregator endpoint and merge the answers.
//!
//! Units run as tasks in a [`JoinSet`], gated by a semaphore sized by
//! `aggregator.max_concurrency`; units beyond that wait for a permit. Each
//! unit returns its own outcome and the coordinator merges them one by one
//! as they are joined, so no state is shared between units. A failed unit
//! is counted in `failed` and never cancels its siblings.
//!
//! Dropping the [`JoinSet`] aborts every outstanding unit. That happens when
//! the optional deadline expires and when the client goes away (the handler
//! future is dropped with the set inside it).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use http_body_util::BodyExt;
use serde::{Deserialize, Serialize, Serializer};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::executor::Executor;
use crate::config::model::{AggregatorConfig, FailurePolicy};
use crate::error::{EdgeError, ProxyError};
use crate::server::AppState;

#[allow(clippy::trivially_copy_pass_by_ref)]
fn as_millis<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{} ms", elapsed.as_millis()))
}

/// One successful backend call.
#[derive(Debug, Clone, Serialize)]
pub struct BackendCallResult {
    pub uuid: String,
    pub hostname: String,
    #[serde(rename = "exec_time", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

/// Shape of the backend's answer. Its own `exec_time` is ignored; the
/// aggregator reports the time it measured itself.
#[derive(Debug, Deserialize)]
struct ProbeBody {
    uuid: String,
    hostname: String,
}

/// Serialized as `{"responses": [...], "<bucket>": n, ..., "count_by_source":
/// {...}, "failed": n, "total_time": "<ms> ms"}`.
#[derive(Debug, Serialize)]
pub struct AggregatedOutcome {
    pub responses: Vec<BackendCallResult>,
    #[serde(flatten)]
    pub buckets: BTreeMap<String, u64>,
    pub count_by_source: BTreeMap<String, u64>,
    pub failed: usize,
    #[serde(serialize_with = "as_millis")]
    pub total_time: Duration,
}

impl AggregatedOutcome {
    fn empty(buckets: &[String]) -> Self {
        Self {
            responses: Vec::new(),
            buckets: buckets.iter().map(|b| (b.clone(), 0)).collect(),
            count_by_source: BTreeMap::new(),
            failed: 0,
            total_time: Duration::ZERO,
        }
    }

    fn record(&mut self, result: BackendCallResult, identities: &BTreeMap<String, String>) {
        if let Some(bucket) = identities.get(&result.hostname) {
            *self.buckets.entry(bucket.clone()).or_default() += 1;
        }
        *self
            .count_by_source
            .entry(result.hostname.clone())
            .or_default() += 1;
        self.responses.push(result);
    }

    #[must_use]
    pub fn attempted(&self) -> usize {
        self.responses.len() + self.failed
    }
}

pub struct Aggregator {
    executor: Executor,
    endpoint: Uri,
    max_concurrency: usize,
    max_count: u64,
    call_timeout: Option<Duration>,
    deadline: Option<Duration>,
    policy: FailurePolicy,
    identities: BTreeMap<String, String>,
    buckets: Vec<String>,
}

impl Aggregator {
    pub fn new(config: &AggregatorConfig, executor: Executor) -> Result<Self, EdgeError> {
        let endpoint = config
            .endpoint
            .parse::<Uri>()
            .map_err(|e| EdgeError::UriParse {
                source: Box::new(e),
            })?;

        Ok(Self {
            executor,
            endpoint,
            max_concurrency: config.max_concurrency.max(1),
            max_count: config.max_count,
            call_timeout: config.call_timeout(),
            deadline: config.deadline(),
            policy: config.failure_policy,
            identities: config.identities.clone(),
            buckets: config.buckets().into_iter().map(String::from).collect(),
        })
    }

    #[must_use]
    pub const fn endpoint(&self) -> &Uri {
        &self.endpoint
    }

    /// Validate the raw `count` query value.
    pub fn parse_count(&self, raw: Option<&str>) -> Result<usize, ProxyError> {
        let raw = raw
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ProxyError::InvalidParameter("count parameter is required".into()))?;
        let count: i64 = raw
            .parse()
            .map_err(|_| ProxyError::InvalidParameter("invalid count parameter".into()))?;
        if count < 1 {
            return Err(ProxyError::InvalidParameter("count must be at least 1".into()));
        }
        if u64::try_from(count).map_or(true, |c| c > self.max_count) {
            return Err(ProxyError::InvalidParameter(format!(
                "count exceeds limit of {}",
                self.max_count
            )));
        }
        usize::try_from(count)
            .map_err(|_| ProxyError::InvalidParameter("invalid count parameter".into()))
    }

    /// Run `count` calls and merge whatever completes before the deadline.
    pub async fn aggregate(&self, count: usize, correlation_id: &str) -> AggregatedOutcome {
        let start = Instant::now();
        let gate = Arc::new(Semaphore::new(self.max_concurrency));
        let mut units = JoinSet::new();

        for _ in 0..count {
            units.spawn(run_unit(
                Arc::clone(&gate),
                self.executor.clone(),
                self.endpoint.clone(),
                self.call_timeout,
            ));
        }

        let mut outcome = AggregatedOutcome::empty(&self.buckets);

        match self.deadline {
            Some(limit) => {
                let drained = tokio::time::timeout(
                    limit,
                    self.drain(&mut units, &mut outcome, correlation_id),
                )
                .await;
                if drained.is_err() {
                    let outstanding = units.len();
                    units.abort_all();
                    outcome.failed += outstanding;
                    tracing::warn!(
                        correlation_id = %correlation_id,
                        outstanding,
                        deadline_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                        "aggregation deadline expired, aborting outstanding calls"
                    );
                }
            }
            None => self.drain(&mut units, &mut outcome, correlation_id).await,
        }

        outcome.total_time = start.elapsed();
        outcome
    }

    async fn drain(
        &self,
        units: &mut JoinSet<Result<BackendCallResult, ProxyError>>,
        outcome: &mut AggregatedOutcome,
        correlation_id: &str,
    ) {
        while let Some(joined) = units.join_next().await {
            match joined {
                Ok(Ok(result)) => outcome.record(result, &self.identities),
                Ok(Err(e)) => {
                    outcome.failed += 1;
                    tracing::warn!(
                        correlation_id = %correlation_id,
                        endpoint = %self.endpoint,
                        error = %e,
                        "aggregated call failed"
                    );
                }
                Err(join_err) => {
                    outcome.failed += 1;
                    tracing::error!(
                        correlation_id = %correlation_id,
                        error = %join_err,
                        "aggregated call task panicked"
                    );
                }
            }
        }
    }

    /// Apply the configured failure policy to a finished aggregation.
    pub fn settle(&self, outcome: AggregatedOutcome) -> Result<AggregatedOutcome, ProxyError> {
        if self.policy == FailurePolicy::Closed && outcome.failed > 0 {
            return Err(ProxyError::AggregationIncomplete {
                failed: outcome.failed,
                attempted: outcome.attempted(),
            });
        }
        Ok(outcome)
    }
}

/// One unit of fan-out: wait for a permit, then make a single call.
async fn run_unit(
    gate: Arc<Semaphore>,
    executor: Executor,
    endpoint: Uri,
    call_timeout: Option<Duration>,
) -> Result<BackendCallResult, ProxyError> {
    let _permit = gate
        .acquire_owned()
        .await
        .map_err(|e| ProxyError::BackendUnavailable(e.to_string()))?;

    match call_timeout {
        Some(limit) => tokio::time::timeout(limit, probe(&executor, endpoint))
            .await
            .unwrap_or_else(|_| {
                Err(ProxyError::BackendUnavailable(format!(
                    "call timed out after {}ms",
                    limit.as_millis()
                )))
            }),
        None => probe(&executor, endpoint).await,
    }
}

async fn probe(executor: &Executor, endpoint: Uri) -> Result<BackendCallResult, ProxyError> {
    let start = Instant::now();
    let request = hyper::Request::get(endpoint)
        .body(Body::empty())
        .map_err(|e| ProxyError::RequestConstructionFailed(e.to_string()))?;

    let response = executor.send(request, None).await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ProxyError::BackendUnavailable(format!(
            "backend answered {status}"
        )));
    }

    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| ProxyError::BackendUnavailable(format!("body read error: {e}")))?
        .to_bytes();
    let decoded: ProbeBody =
        serde_json::from_slice(&body).map_err(|e| ProxyError::DecodeFailure(e.to_string()))?;

    Ok(BackendCallResult {
        uuid: decoded.uuid,
        hostname: decoded.hostname,
        elapsed: start.elapsed(),
    })
}

/// First `count` value of the query string. Repeated keys are not an
/// error; later values are ignored.
fn count_param(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == "count")
        .map(|(_, value)| value.into_owned())
}

pub async fn aggregate_handler(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let correlation_id = super::correlation_id(&headers);
    let aggregator = &state.aggregator;

    let raw_count = count_param(query.as_deref());
    let count = match aggregator.parse_count(raw_count.as_deref()) {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!(correlation_id = %correlation_id, error = %e, "rejected aggregation");
            return e.into_response();
        }
    };

    tracing::info!(
        correlation_id = %correlation_id,
        count,
        endpoint = %aggregator.endpoint(),
        "aggregation started"
    );

    let outcome = aggregator.aggregate(count, &correlation_id).await;

    tracing::info!(
        correlation_id = %correlation_id,
        succeeded = outcome.responses.len(),
        failed = outcome.failed,
        total_ms = u64::try_from(outcome.total_time.as_millis()).unwrap_or(u64::MAX),
        "aggregation finished"
    );

    match aggregator.settle(outcome) {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => e.into_response(),
    }
}
