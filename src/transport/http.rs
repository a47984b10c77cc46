use super::{BatchTransport, TransportError};
use crate::batch::{generate_boundary, BatchEnvelope};
use crate::{BoxStream, Result};
use bytes::Bytes;
use futures::TryStreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::Proxy;
use std::env;
use std::time::Duration;
use tracing::{debug, info};

/// reqwest-backed [`BatchTransport`].
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        // Minimal production-friendly defaults (env-overridable).
        let timeout_secs = env::var("BATCH_STREAM_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(120);

        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .pool_max_idle_per_host(
                env::var("BATCH_STREAM_HTTP_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(16),
            )
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        if let Ok(proxy_url) = env::var("BATCH_STREAM_PROXY_URL") {
            if let Ok(proxy) = Proxy::all(&proxy_url) {
                builder = builder.proxy(proxy);
            }
        }

        let client = builder
            .build()
            .map_err(|e| crate::Error::Transport(TransportError::Other(e.to_string())))?;

        Ok(Self { client })
    }

    /// Wrap an existing client (shared pools, custom TLS, tests).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl BatchTransport for HttpTransport {
    async fn send(&self, envelope: &BatchEnvelope) -> Result<BoxStream<'static, Bytes>> {
        let boundary = generate_boundary();
        let body = envelope.render(&boundary);
        info!(
            batch = envelope.seq,
            parts = envelope.parts.len(),
            bytes = body.len(),
            "dispatching batch"
        );

        let mut req = self
            .client
            .request(
                reqwest::Method::from_bytes(envelope.method.as_bytes())
                    .map_err(|e| crate::Error::Transport(TransportError::Other(e.to_string())))?,
                &envelope.url,
            )
            .header(CONTENT_TYPE, BatchEnvelope::content_type(&boundary))
            .body(body);

        if let Some(token) = envelope.bearer_token() {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| crate::Error::Transport(TransportError::Http(e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(crate::Error::Transport(TransportError::Status {
                status: status.as_u16(),
                body,
            }));
        }
        debug!(batch = envelope.seq, %status, "batch response streaming");

        let byte_stream = resp
            .bytes_stream()
            .map_err(|e| crate::Error::Transport(TransportError::Http(e)));
        Ok(Box::pin(byte_stream))
    }
}
