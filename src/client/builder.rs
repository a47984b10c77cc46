use super::config::BatchStreamConfig;
use super::core::BatchClient;
use crate::auth::{resolve_token, AccessTokenSource};
use crate::resilience::rate_limiter::{RateLimiter, RateLimiterConfig};
use crate::transport::{BatchTransport, HttpTransport};
use crate::{Error, ErrorContext, Result};
use std::sync::Arc;
use tracing::info;

/// Builder for creating clients with custom configuration.
///
/// Keep this surface area small and predictable.
pub struct BatchClientBuilder {
    config: BatchStreamConfig,
    access_token: Option<String>,
    transport: Option<Arc<dyn BatchTransport>>,
    rate_limiter: Option<RateLimiter>,
}

impl BatchClientBuilder {
    pub fn new() -> Self {
        Self {
            config: BatchStreamConfig::default(),
            access_token: None,
            transport: None,
            rate_limiter: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: BatchStreamConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a bearer token obtained elsewhere.
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Override the batch endpoint (primarily for testing with mock servers).
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    /// Limit maximum number of in-flight batch calls. Zero is rejected by `build`.
    pub fn parallel_requests(mut self, n: usize) -> Self {
        self.config.parallel_requests = n;
        self
    }

    /// Inject a transport. Default is [`HttpTransport`].
    pub fn transport(mut self, transport: Arc<dyn BatchTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Share an existing quota gate, e.g. between clients for the same user.
    pub fn rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Resolve the token from `source`, then build.
    pub async fn build_with_token_source(
        mut self,
        source: &dyn AccessTokenSource,
    ) -> Result<BatchClient> {
        self.access_token = Some(resolve_token(source).await?);
        self.build()
    }

    pub fn build(self) -> Result<BatchClient> {
        self.config.validate()?;

        let access_token = match self.access_token {
            Some(t) if !t.trim().is_empty() => t,
            _ => {
                return Err(Error::authentication_with_context(
                    "an access token is required",
                    ErrorContext::new()
                        .with_details("call access_token() or build_with_token_source()")
                        .with_source("client_builder"),
                ))
            }
        };

        let limiter = match self.rate_limiter {
            Some(l) => l,
            None => RateLimiter::new(RateLimiterConfig::new(
                self.config.user_quota,
                self.config.user_quota_time(),
            ))?,
        };

        let transport: Arc<dyn BatchTransport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::new()?),
        };

        info!(
            endpoint = %self.config.endpoint,
            user_quota = self.config.user_quota,
            parallel_requests = self.config.parallel_requests,
            "batch client ready"
        );

        Ok(BatchClient {
            config: self.config,
            access_token,
            transport,
            limiter,
        })
    }
}

impl Default for BatchClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchClient {
    /// Build a client from `config`, resolving the token from `source`.
    pub async fn from_token_source(
        source: &dyn AccessTokenSource,
        config: BatchStreamConfig,
    ) -> Result<Self> {
        BatchClientBuilder::new()
            .config(config)
            .build_with_token_source(source)
            .await
    }

    /// Default configuration with a token known up front.
    pub fn with_token(token: impl Into<String>) -> Result<Self> {
        BatchClientBuilder::new().access_token(token).build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;

    #[test]
    fn test_build_requires_token() {
        let err = BatchClientBuilder::new().build().unwrap_err();
        assert!(matches!(err, Error::Authentication { .. }));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let err = BatchClientBuilder::new()
            .access_token("t")
            .config(BatchStreamConfig::new().with_batch_size(0))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_zero_parallel_requests_is_rejected() {
        let err = BatchClientBuilder::new()
            .access_token("t")
            .parallel_requests(0)
            .build()
            .unwrap_err();
        match err {
            Error::Configuration { context, .. } => {
                assert_eq!(context.field_path.as_deref(), Some("parallel_requests"))
            }
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_build_with_token_source() {
        let client = BatchClientBuilder::new()
            .endpoint("http://localhost:1/batch")
            .parallel_requests(3)
            .build_with_token_source(&StaticToken::new("abc"))
            .await
            .unwrap();
        assert_eq!(client.access_token, "abc");
        assert_eq!(client.config().parallel_requests, 3);
        assert_eq!(client.config().endpoint, "http://localhost:1/batch");
        assert!(!format!("{:?}", client).contains("abc"));
    }

    #[tokio::test]
    async fn test_shared_rate_limiter() {
        let limiter = RateLimiter::new(RateLimiterConfig::new(
            10,
            std::time::Duration::from_secs(60),
        ))
        .unwrap();
        let a = BatchClientBuilder::new()
            .access_token("t")
            .rate_limiter(limiter.clone())
            .build()
            .unwrap();
        assert!(limiter.try_acquire(4).await);
        assert_eq!(a.quota_snapshot().await.tokens, 6.0);
    }
}
