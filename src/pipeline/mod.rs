//! 流水线模块：分批、限流、发送、拆分、解析与解码的编排。
//!
//! # Batch Pipeline
//!
//! This module turns a descriptor stream into a result stream.
//!
//! ## Pipeline Stages
//!
//! ```text
//! CallDescriptor → into_batches → RateLimiter::acquire → RequestEncoder
//!                                                            │
//!                                                     BatchTransport::send
//!                                                            │
//! ItemResult ← decode_result ← parse_sub_response ← MultipartSplitter
//! ```
//!
//! Up to `parallel_requests` batch responses are decoded concurrently and
//! merged in completion order.
//!
//! ## Submodules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`decode`] | Streaming multipart splitter (codec) |
//! | [`response`] | Sub-response parser (status, headers, body, Content-ID) |
//! | [`result`] | Status filtering and JSON decoding |
//!
//! ## Failure model
//!
//! A batch whose transport call or framing fails yields exactly one `Err`
//! and then ends; other batches keep going. Per-item JSON problems never
//! produce `Err`.

pub mod decode;
pub mod response;
pub mod result;

#[cfg(test)]
mod tests;

use crate::batch::{into_batches, Batch, RequestEncoder};
use crate::client::BatchClient;
use crate::resilience::rate_limiter::RateLimiter;
use crate::transport::BatchTransport;
use crate::types::{CallDescriptor, ItemResult};
use crate::{BoxStream, Error, ErrorContext, Result};
use bytes::Bytes;
use futures::{future, stream, Stream, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, info};

pub use decode::{split_chunks, split_stream, MultipartSplitter, SubResponseBlock};
pub use response::{parse_sub_response, ParsedSubResponse};
pub use result::decode_result;

/// Per-pipeline overrides of the client configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    pub batch_size: Option<usize>,
    pub quota_cost_per_item: Option<u32>,
    pub filter_errors: Option<bool>,
}

impl PipelineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.batch_size = Some(n);
        self
    }

    pub fn quota_cost_per_item(mut self, cost: u32) -> Self {
        self.quota_cost_per_item = Some(cost);
        self
    }

    pub fn filter_errors(mut self, filter: bool) -> Self {
        self.filter_errors = Some(filter);
        self
    }
}

/// A validated, ready-to-run pipeline.
#[derive(Clone)]
pub struct BatchPipeline {
    encoder: RequestEncoder,
    transport: Arc<dyn BatchTransport>,
    limiter: RateLimiter,
    parallel_requests: usize,
    batch_size: usize,
    batch_cost: u32,
    filter_errors: bool,
}

impl BatchPipeline {
    pub fn new(client: &BatchClient, options: PipelineOptions) -> Result<Self> {
        let cfg = &client.config;
        let batch_size = options.batch_size.unwrap_or(cfg.batch_size);
        let cost_per_item = options
            .quota_cost_per_item
            .unwrap_or(cfg.quota_cost_per_item);
        let filter_errors = options.filter_errors.unwrap_or(cfg.filter_errors);

        if batch_size == 0 {
            return Err(Error::configuration_with_context(
                "batch_size must be greater than zero",
                ErrorContext::new()
                    .with_field_path("batch_size")
                    .with_source("pipeline"),
            ));
        }

        let batch_cost = (cost_per_item as u64)
            .checked_mul(batch_size as u64)
            .filter(|c| *c as f64 <= client.limiter.capacity())
            .ok_or_else(|| {
                Error::configuration_with_context(
                    "per-batch quota cost exceeds the rate limiter capacity",
                    ErrorContext::new()
                        .with_field_path("quota_cost_per_item")
                        .with_details(format!(
                            "{} x {} > {}",
                            cost_per_item,
                            batch_size,
                            client.limiter.capacity()
                        ))
                        .with_source("pipeline"),
                )
            })? as u32;

        Ok(Self {
            encoder: RequestEncoder::new(cfg.endpoint.clone(), client.access_token.clone()),
            transport: Arc::clone(&client.transport),
            limiter: client.limiter.clone(),
            parallel_requests: cfg.parallel_requests.max(1),
            batch_size,
            batch_cost,
            filter_errors,
        })
    }

    pub fn batch_cost(&self) -> u32 {
        self.batch_cost
    }

    /// Run the pipeline over `input`.
    ///
    /// Upstream is pulled one batch at a time, and only when a dispatch slot
    /// is free and the quota admits the batch.
    pub fn run<S>(&self, input: S) -> BoxStream<'static, ItemResult>
    where
        S: Stream<Item = CallDescriptor> + Send + 'static,
    {
        let limiter = self.limiter.clone();
        let batch_cost = self.batch_cost;
        let admitted = into_batches(input, self.batch_size).then(move |batch| {
            let limiter = limiter.clone();
            async move {
                limiter.acquire(batch_cost).await?;
                debug!(batch = batch.seq, cost = batch_cost, "batch admitted");
                Ok::<Batch, Error>(batch)
            }
        });

        let this = self.clone();
        Box::pin(
            admitted
                .map(move |batch| this.dispatch(batch))
                .flatten_unordered(self.parallel_requests),
        )
    }

    fn dispatch(&self, admitted: Result<Batch>) -> BoxStream<'static, ItemResult> {
        let encoder = self.encoder.clone();
        let transport = Arc::clone(&self.transport);
        let batch_size = self.batch_size;
        let filter_errors = self.filter_errors;

        let response = async move {
            let batch = admitted?;
            let envelope = encoder.encode(&batch)?;
            info!(batch = batch.seq, items = batch.len(), "sending batch");
            let body = transport.send(&envelope).await?;
            Ok::<_, Error>(decode_response(
                body,
                batch.seq * batch_size,
                filter_errors,
            ))
        };

        fuse_on_error(Box::pin(stream::once(response).try_flatten()))
    }
}

/// Split, parse and decode one batch response body.
///
/// `offset` is added to each sub-response's `Content-ID` to recover the
/// submission index of the originating descriptor.
pub fn decode_response(
    body: BoxStream<'static, Bytes>,
    offset: usize,
    filter_errors: bool,
) -> BoxStream<'static, ItemResult> {
    let items = split_stream(body)
        .try_filter_map(move |block| {
            future::ready(
                parse_sub_response(&block)
                    .map(|parsed| parsed.and_then(|p| decode_result(&p, filter_errors))),
            )
        })
        .map_ok(move |mut item| {
            item.index = item.index.map(|i| offset + i);
            item
        });
    fuse_on_error(Box::pin(items))
}

/// End the stream right after its first error.
fn fuse_on_error<T: Send + 'static>(input: BoxStream<'static, T>) -> BoxStream<'static, T> {
    Box::pin(input.scan(false, |failed, item| {
        if *failed {
            return future::ready(None);
        }
        *failed = item.is_err();
        future::ready(Some(item))
    }))
}

impl BatchClient {
    /// Turn a stream of call descriptors into a stream of decoded results.
    ///
    /// Settings not given in `options` come from the client configuration.
    /// Invalid combinations (e.g. a per-batch cost above the quota) fail here,
    /// before any input is consumed.
    pub fn pipeline<S>(
        &self,
        input: S,
        options: PipelineOptions,
    ) -> Result<BoxStream<'static, ItemResult>>
    where
        S: Stream<Item = CallDescriptor> + Send + 'static,
    {
        Ok(BatchPipeline::new(self, options)?.run(input))
    }
}
