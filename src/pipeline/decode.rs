//! Streaming multipart splitter (Bytes -> sub-response blocks)
//!
//! The boundary is not configured: it is learned from the first line of the
//! body, because the server picks its own response boundary. The splitter is a
//! [`Decoder`] so it can sit behind a `FramedRead` over any chunked byte source.

use crate::{BoxStream, Error};
use bytes::{Buf, Bytes, BytesMut};
use futures::TryStreamExt;
use std::sync::Arc;
use tokio_util::codec::{Decoder, FramedRead};
use tokio_util::io::StreamReader;
use tracing::debug;

/// Text of one sub-response, as found between two boundary markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubResponseBlock {
    /// Boundary marker line learned from the stream (e.g. `--batch_abc`).
    /// `None` when the stream ended before a first line was complete.
    pub boundary: Option<Arc<str>>,
    pub text: String,
}

impl SubResponseBlock {
    pub fn new(boundary: Option<Arc<str>>, text: impl Into<String>) -> Self {
        Self {
            boundary,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    SeekingBoundary,
    Accumulating,
    End,
}

/// Three-state splitter: SEEKING_BOUNDARY → ACCUMULATING → END.
#[derive(Debug)]
pub struct MultipartSplitter {
    state: State,
    boundary: Option<Arc<str>>,
    /// Offset up to which the buffer is known not to contain a boundary start.
    scanned: usize,
    /// Whitespace right after a boundary is dropped, even if it arrives later.
    skip_leading_ws: bool,
}

impl MultipartSplitter {
    pub fn new() -> Self {
        Self {
            state: State::SeekingBoundary,
            boundary: None,
            scanned: 0,
            skip_leading_ws: false,
        }
    }

    pub fn boundary(&self) -> Option<&str> {
        self.boundary.as_deref()
    }

    fn learn_boundary(&mut self, buf: &mut BytesMut) -> bool {
        let blank = buf.iter().take_while(|b| b.is_ascii_whitespace()).count();
        buf.advance(blank);
        let Some(nl) = buf.iter().position(|b| *b == b'\n') else {
            return false;
        };
        let line = buf.split_to(nl + 1);
        let boundary = String::from_utf8_lossy(&line).trim().to_string();
        debug!(boundary = %boundary, "multipart boundary discovered");
        self.boundary = Some(Arc::from(boundary));
        self.state = State::Accumulating;
        self.skip_leading_ws = true;
        self.scanned = 0;
        true
    }

    fn skip_whitespace(&mut self, buf: &mut BytesMut) {
        if !self.skip_leading_ws {
            return;
        }
        let n = buf
            .iter()
            .take_while(|b| b.is_ascii_whitespace())
            .count();
        buf.advance(n);
        if !buf.is_empty() {
            self.skip_leading_ws = false;
        }
    }

    fn block(&self, bytes: &[u8]) -> SubResponseBlock {
        SubResponseBlock::new(
            self.boundary.clone(),
            String::from_utf8_lossy(bytes).into_owned(),
        )
    }

    /// End-of-stream pass over whatever is left in the buffer.
    fn finish(&mut self, buf: &mut BytesMut) -> Option<SubResponseBlock> {
        if self.state == State::End {
            return None;
        }
        self.state = State::End;

        let rest = buf.split();
        let text = String::from_utf8_lossy(&rest);
        let mut residual = text.trim_end();
        if let Some(boundary) = self.boundary.as_deref() {
            let last_line_start = residual.rfind('\n').map(|i| i + 1).unwrap_or(0);
            if residual[last_line_start..].contains(boundary) {
                residual = residual[..last_line_start].trim_end();
            }
        }

        if residual.is_empty() || residual.trim() == "--" {
            return None;
        }
        Some(SubResponseBlock::new(self.boundary.clone(), residual))
    }
}

impl Default for MultipartSplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MultipartSplitter {
    type Item = SubResponseBlock;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.state == State::SeekingBoundary && !self.learn_boundary(buf) {
            return Ok(None);
        }
        if self.state == State::End {
            return Ok(None);
        }

        self.skip_whitespace(buf);
        let Some(boundary) = self.boundary.clone() else {
            return Ok(None);
        };
        let needle = boundary.as_bytes();
        if needle.is_empty() {
            return Ok(None);
        }

        let start = self.scanned.min(buf.len());
        match find(&buf[start..], needle) {
            Some(pos) => {
                let idx = start + pos;
                let block = buf.split_to(idx);
                buf.advance(needle.len());
                self.scanned = 0;
                self.skip_leading_ws = true;
                self.skip_whitespace(buf);
                Ok(Some(self.block(&block)))
            }
            None => {
                // A boundary may straddle the next chunk; rescan its possible prefix.
                self.scanned = buf.len().saturating_sub(needle.len() - 1);
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(block) => Ok(Some(block)),
            None => Ok(self.finish(buf)),
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Split a streamed multipart body into sub-response blocks.
pub fn split_stream(input: BoxStream<'static, Bytes>) -> BoxStream<'static, SubResponseBlock> {
    let reader = StreamReader::new(input.map_err(std::io::Error::other));
    Box::pin(FramedRead::new(reader, MultipartSplitter::new()).map_err(unwrap_source_error))
}

/// Chunk errors cross `StreamReader` as `io::Error`; hand back the original
/// crate error (e.g. `Error::Transport`) instead of `Error::Io`.
fn unwrap_source_error(err: Error) -> Error {
    let Error::Io(io) = err else {
        return err;
    };
    if !io.get_ref().is_some_and(|inner| inner.is::<Error>()) {
        return Error::Io(io);
    }
    match io.into_inner().map(|inner| inner.downcast::<Error>()) {
        Some(Ok(inner)) => *inner,
        Some(Err(other)) => Error::Io(std::io::Error::other(other)),
        None => Error::Io(std::io::Error::other("byte stream failed")),
    }
}

/// Convenience for already-buffered chunks (tests, replay tooling).
pub fn split_chunks<I, B>(chunks: I) -> BoxStream<'static, SubResponseBlock>
where
    I: IntoIterator<Item = B>,
    I::IntoIter: Send + 'static,
    B: Into<Bytes>,
{
    let stream = futures::stream::iter(chunks.into_iter().map(|c| Ok::<Bytes, Error>(c.into())));
    split_stream(Box::pin(stream))
}
