use crate::batch::DEFAULT_BATCH_ENDPOINT;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Constructor-time configuration for a [`super::BatchClient`].
///
/// Defaults match the per-user quota of Google APIs: 25000 quota units per
/// 100 seconds, 10 parallel batch calls of 100 items each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchStreamConfig {
    /// Quota units available per `user_quota_time` window.
    pub user_quota: u32,
    /// Quota window in milliseconds.
    pub user_quota_time_ms: u64,
    /// Maximum number of batch HTTP calls in flight.
    pub parallel_requests: usize,
    /// Descriptors per batch.
    pub batch_size: usize,
    /// Quota units charged per descriptor.
    pub quota_cost_per_item: u32,
    /// Drop non-200 and undecodable items instead of reporting them.
    pub filter_errors: bool,
    /// Batch endpoint URL.
    pub endpoint: String,
}

impl Default for BatchStreamConfig {
    fn default() -> Self {
        Self {
            user_quota: 25_000,
            user_quota_time_ms: 100_000,
            parallel_requests: 10,
            batch_size: 100,
            quota_cost_per_item: 1,
            filter_errors: false,
            endpoint: DEFAULT_BATCH_ENDPOINT.to_string(),
        }
    }
}

impl BatchStreamConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_quota_time(&self) -> Duration {
        Duration::from_millis(self.user_quota_time_ms)
    }

    pub fn with_user_quota(mut self, quota: u32) -> Self {
        self.user_quota = quota;
        self
    }

    pub fn with_user_quota_time(mut self, window: Duration) -> Self {
        self.user_quota_time_ms = window.as_millis() as u64;
        self
    }

    pub fn with_parallel_requests(mut self, n: usize) -> Self {
        self.parallel_requests = n;
        self
    }

    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    pub fn with_quota_cost_per_item(mut self, cost: u32) -> Self {
        self.quota_cost_per_item = cost;
        self
    }

    pub fn with_filter_errors(mut self, filter: bool) -> Self {
        self.filter_errors = filter;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Defaults overridden by `BATCH_STREAM_*` environment variables.
    ///
    /// - `BATCH_STREAM_USER_QUOTA`
    /// - `BATCH_STREAM_USER_QUOTA_TIME_MS`
    /// - `BATCH_STREAM_PARALLEL_REQUESTS`
    /// - `BATCH_STREAM_BATCH_SIZE`
    /// - `BATCH_STREAM_QUOTA_COST_PER_ITEM`
    /// - `BATCH_STREAM_FILTER_ERRORS` (`1`/`true`/`yes`)
    /// - `BATCH_STREAM_ENDPOINT`
    pub fn from_env() -> Self {
        Self::default().merge_env()
    }

    /// Apply `BATCH_STREAM_*` overrides on top of `self`; unparsable values are ignored.
    pub fn merge_env(mut self) -> Self {
        if let Some(v) = env_parse("BATCH_STREAM_USER_QUOTA") {
            self.user_quota = v;
        }
        if let Some(v) = env_parse("BATCH_STREAM_USER_QUOTA_TIME_MS") {
            self.user_quota_time_ms = v;
        }
        if let Some(v) = env_parse("BATCH_STREAM_PARALLEL_REQUESTS") {
            self.parallel_requests = v;
        }
        if let Some(v) = env_parse("BATCH_STREAM_BATCH_SIZE") {
            self.batch_size = v;
        }
        if let Some(v) = env_parse("BATCH_STREAM_QUOTA_COST_PER_ITEM") {
            self.quota_cost_per_item = v;
        }
        if let Ok(v) = env::var("BATCH_STREAM_FILTER_ERRORS") {
            self.filter_errors = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = env::var("BATCH_STREAM_ENDPOINT") {
            if !v.trim().is_empty() {
                self.endpoint = v;
            }
        }
        self
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Reject settings the pipeline can never satisfy.
    pub fn validate(&self) -> Result<()> {
        check_positive("user_quota", self.user_quota as u64)?;
        check_positive("user_quota_time_ms", self.user_quota_time_ms)?;
        check_positive("parallel_requests", self.parallel_requests as u64)?;
        check_positive("batch_size", self.batch_size as u64)?;
        if self.endpoint.trim().is_empty() {
            return Err(Error::configuration_with_context(
                "batch endpoint must not be empty",
                ErrorContext::new()
                    .with_field_path("endpoint")
                    .with_source("config"),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse::<T>().ok())
}

fn check_positive(field: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(Error::configuration_with_context(
            format!("{} must be greater than zero", field),
            ErrorContext::new()
                .with_field_path(field.to_string())
                .with_source("config"),
        ));
    }
    Ok(())
}
