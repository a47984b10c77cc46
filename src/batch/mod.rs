//! 批处理模块：描述符分批与 multipart 批量请求编码。
//!
//! # Request Batching Module
//!
//! Groups call descriptors into bounded batches and encodes each batch as a
//! single `multipart/mixed` HTTP request.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`BatchCollector`] | Buffers descriptors until a batch is full |
//! | [`into_batches`] | Stream adapter over [`BatchCollector`] |
//! | [`RequestEncoder`] | Builds a [`BatchEnvelope`] from a [`Batch`] |
//! | [`BatchEnvelope`] | Outer request plus one [`MimePart`] per call |
//!
//! ## Example
//!
//! ```rust
//! use batch_stream::batch::{BatchCollector, RequestEncoder, DEFAULT_BATCH_ENDPOINT};
//! use batch_stream::CallDescriptor;
//!
//! let mut collector = BatchCollector::new(2);
//! assert!(collector.push(CallDescriptor::get("https://example.com/a")).is_none());
//! let batch = collector
//!     .push(CallDescriptor::get("https://example.com/b"))
//!     .expect("batch is full");
//!
//! let envelope = RequestEncoder::new(DEFAULT_BATCH_ENDPOINT, "token").encode(&batch)?;
//! assert_eq!(envelope.parts.len(), 2);
//! # Ok::<(), batch_stream::Error>(())
//! ```

mod collector;
mod envelope;

pub use collector::{into_batches, Batch, BatchCollector};
pub use envelope::{
    generate_boundary, BatchEnvelope, MimePart, RequestEncoder, DEFAULT_BATCH_ENDPOINT,
};
