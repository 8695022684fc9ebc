//! Serde data structures for the edge-relay configuration file.
//!
//! Contains [`Config`] (the root), [`RelayConfig`], [`AggregatorConfig`],
//! and [`FailurePolicy`]. Every section has complete defaults so that the
//! service runs without a config file; all types use `deny_unknown_fields`
//! for strict parsing.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[allow(clippy::unnecessary_wraps)]
fn default_backend_url() -> Option<String> {
    Some("http://localhost:8081".to_string())
}

fn default_prefix() -> String {
    "/api/".to_string()
}

const fn default_relay_timeout() -> u64 {
    15_000
}

fn default_endpoint() -> String {
    "http://localhost:8081/api/info".to_string()
}

const fn default_max_concurrency() -> usize {
    64
}

const fn default_max_count() -> u64 {
    10_000
}

fn default_identities() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("backend-1".to_string(), "backend1_count".to_string()),
        ("backend-2".to_string(), "backend2_count".to_string()),
    ])
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub aggregator: AggregatorConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Base URL of the relay backend. `null` or an empty string leaves the
    /// relay unconfigured.
    #[serde(default = "default_backend_url")]
    pub backend_url: Option<String>,

    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Per-call timeout in milliseconds.
    #[serde(default = "default_relay_timeout")]
    pub timeout: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            prefix: default_prefix(),
            timeout: default_relay_timeout(),
        }
    }
}

impl RelayConfig {
    #[must_use]
    pub fn backend_url(&self) -> Option<&str> {
        self.backend_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Answer 200 and report failed calls in the `failed` field.
    #[default]
    Open,
    /// Answer 502 as soon as any call failed.
    Closed,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AggregatorConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default = "default_max_count")]
    pub max_count: u64,

    /// Per-call timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_timeout: Option<u64>,

    /// Deadline for a whole aggregation in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<u64>,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Backend hostname → counter bucket name in the aggregated response.
    #[serde(default = "default_identities")]
    pub identities: BTreeMap<String, String>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            max_concurrency: default_max_concurrency(),
            max_count: default_max_count(),
            call_timeout: None,
            deadline: None,
            failure_policy: FailurePolicy::default(),
            identities: default_identities(),
        }
    }
}

impl AggregatorConfig {
    #[must_use]
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout.map(Duration::from_millis)
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline.map(Duration::from_millis)
    }

    /// Distinct bucket names, sorted.
    #[must_use]
    pub fn buckets(&self) -> Vec<&str> {
        let mut buckets: Vec<&str> = self.identities.values().map(String::as_str).collect();
        buckets.sort_unstable();
        buckets.dedup();
        buckets
    }
}
