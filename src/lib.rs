//! # batch-stream
//!
//! 批量流水线：将单个远程调用描述批量编码为 multipart/mixed 请求，并流式解码批量响应。
//!
//! Quota-aware HTTP batching for APIs that accept a `multipart/mixed` batch
//! envelope (Google-style `/batch` endpoints).
//!
//! ## Overview
//!
//! A stream of [`CallDescriptor`]s goes in, a stream of [`ItemResult`]s comes out.
//! In between the crate groups calls into bounded batches, gates every batch
//! through a delayed-return token bucket, encodes it as one multipart request,
//! and decodes the streamed multipart response without buffering it whole.
//!
//! ```text
//! descriptors → BatchCollector → RateLimiter → BatchEnvelope → transport
//!                                                                 │
//!   results ← ResultDecoder ← SubResponseParser ← MultipartSplitter
//! ```
//!
//! Results arrive in completion order. Up to `parallel_requests` batches are
//! in flight at once.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use batch_stream::{BatchClient, CallDescriptor, PipelineOptions};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> batch_stream::Result<()> {
//!     let client = BatchClient::builder().access_token("ya29.token").build()?;
//!
//!     let calls = vec![
//!         CallDescriptor::get("https://www.googleapis.com/gmail/v1/users/me/messages/1"),
//!         CallDescriptor::get("https://www.googleapis.com/gmail/v1/users/me/messages/2"),
//!     ];
//!
//!     let mut results = client.pipeline(
//!         futures::stream::iter(calls),
//!         PipelineOptions::new().filter_errors(true),
//!     )?;
//!     while let Some(item) = results.next().await {
//!         println!("{:?}", item?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`auth`] | Access-token sources |
//! | [`batch`] | Batch assembly and multipart request encoding |
//! | [`client`] | Client, builder and configuration |
//! | [`pipeline`] | Response splitting, parsing, decoding and orchestration |
//! | [`resilience`] | Delayed-return token-bucket rate limiter |
//! | [`transport`] | HTTP transport seam and reqwest implementation |
//! | [`types`] | Call descriptors and per-item results |

pub mod auth;
pub mod batch;
pub mod client;
pub mod pipeline;
pub mod resilience;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use client::{BatchClient, BatchClientBuilder, BatchStreamConfig};
pub use pipeline::PipelineOptions;
pub use types::{CallDescriptor, ItemPayload, ItemResult};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A specialized Result for pipeline operations
pub type PipeResult<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `PipeResult<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = PipeResult<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
