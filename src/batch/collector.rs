//! Batch collector.

use crate::types::CallDescriptor;
use futures::{stream, Stream, StreamExt};

/// An ordered group of descriptors sent as one multipart request.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Zero-based position of this batch in the pipeline's output of batches.
    pub seq: usize,
    pub items: Vec<CallDescriptor>,
}

impl Batch {
    pub fn new(seq: usize, items: Vec<CallDescriptor>) -> Self {
        Self { seq, items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Buffers consecutive descriptors until a batch of `max_batch_size` is full.
#[derive(Debug)]
pub struct BatchCollector {
    max_batch_size: usize,
    items: Vec<CallDescriptor>,
    next_seq: usize,
}

impl BatchCollector {
    pub fn new(max_batch_size: usize) -> Self {
        let max_batch_size = max_batch_size.max(1);
        Self {
            max_batch_size,
            items: Vec::with_capacity(max_batch_size),
            next_seq: 0,
        }
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add a descriptor; returns the sealed batch once the size is reached.
    pub fn push(&mut self, item: CallDescriptor) -> Option<Batch> {
        self.items.push(item);
        if self.items.len() >= self.max_batch_size {
            Some(self.seal())
        } else {
            None
        }
    }

    /// Seal whatever is buffered (end of input).
    pub fn flush(&mut self) -> Option<Batch> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.seal())
        }
    }

    fn seal(&mut self) -> Batch {
        let items = std::mem::replace(&mut self.items, Vec::with_capacity(self.max_batch_size));
        let batch = Batch::new(self.next_seq, items);
        self.next_seq += 1;
        batch
    }
}

/// Turn a descriptor stream into a stream of batches.
///
/// Upstream is only polled while the downstream asks for the next batch.
pub fn into_batches<S>(input: S, batch_size: usize) -> impl Stream<Item = Batch> + Send
where
    S: Stream<Item = CallDescriptor> + Send + 'static,
{
    let input = input.boxed();
    stream::unfold(
        (input, BatchCollector::new(batch_size), false),
        |(mut input, mut collector, done)| async move {
            if done {
                return None;
            }
            loop {
                match input.next().await {
                    Some(item) => {
                        if let Some(batch) = collector.push(item) {
                            return Some((batch, (input, collector, false)));
                        }
                    }
                    None => {
                        return collector
                            .flush()
                            .map(|batch| (batch, (input, collector, true)));
                    }
                }
            }
        },
    )
}
