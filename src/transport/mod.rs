//! 传输层：批量请求的 HTTP 发送接口。
//!
//! The pipeline only needs one thing from the network: send a
//! [`BatchEnvelope`] as a single POST and hand back the response body as a
//! byte stream. [`BatchTransport`] is that seam; [`HttpTransport`] is the
//! reqwest implementation.

mod http;

pub use http::HttpTransport;

use crate::batch::BatchEnvelope;
use crate::{BoxStream, Result};
use bytes::Bytes;

/// Performs exactly one batch HTTP call per envelope.
#[async_trait::async_trait]
pub trait BatchTransport: Send + Sync {
    /// Send the envelope and return the streamed response body.
    ///
    /// Envelope-level failures (network, non-2xx) are returned as `Err`; the
    /// pipeline treats them as fatal for this batch only.
    async fn send(&self, envelope: &BatchEnvelope) -> Result<BoxStream<'static, Bytes>>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Batch endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Transport error: {0}")]
    Other(String),
}
