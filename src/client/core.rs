use super::builder::BatchClientBuilder;
use super::config::BatchStreamConfig;
use crate::resilience::rate_limiter::{RateLimiter, RateLimiterSnapshot};
use crate::transport::BatchTransport;
use std::sync::Arc;

/// Entry point: holds the token, quota gate and transport shared by every
/// pipeline built from it.
///
/// Pipelines created from the same client share one rate limiter, so
/// concurrent pipelines still respect a single per-user quota.
#[derive(Clone)]
pub struct BatchClient {
    pub(crate) config: BatchStreamConfig,
    pub(crate) access_token: String,
    pub(crate) transport: Arc<dyn BatchTransport>,
    pub(crate) limiter: RateLimiter,
}

impl BatchClient {
    pub fn builder() -> BatchClientBuilder {
        BatchClientBuilder::new()
    }

    pub fn config(&self) -> &BatchStreamConfig {
        &self.config
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Current quota state, for orchestration and diagnostics.
    pub async fn quota_snapshot(&self) -> RateLimiterSnapshot {
        self.limiter.snapshot().await
    }
}

impl std::fmt::Debug for BatchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchClient")
            .field("config", &self.config)
            .field("access_token", &"***")
            .finish_non_exhaustive()
    }
}
