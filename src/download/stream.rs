//! Fixed-size re-chunking of a streamed response body.
//!
//! Transport chunks arrive in whatever sizes the connection produces. The
//! progress accounting works on fixed-size chunks instead, so percent and
//! log milestones do not depend on socket buffering.

use futures_util::{Stream, StreamExt};

/// Regroups a byte stream into chunks of exactly `chunk_size` bytes.
///
/// The final chunk may be shorter. `Ok(None)` (end of body) is returned once
/// the source is exhausted and the buffer is empty.
#[derive(Debug)]
pub struct ChunkReader<S> {
    source: S,
    buffer: Vec<u8>,
    chunk_size: usize,
    exhausted: bool,
}

impl<S, B, E> ChunkReader<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    #[must_use]
    pub fn new(source: S, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            source,
            buffer: Vec::with_capacity(chunk_size),
            chunk_size,
            exhausted: false,
        }
    }

    /// Reads the next chunk.
    ///
    /// # Errors
    ///
    /// Propagates the first error produced by the underlying stream.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, E> {
        while self.buffer.len() < self.chunk_size && !self.exhausted {
            match self.source.next().await {
                Some(Ok(bytes)) => self.buffer.extend_from_slice(bytes.as_ref()),
                Some(Err(e)) => return Err(e),
                None => self.exhausted = true,
            }
        }

        if self.buffer.is_empty() {
            return Ok(None);
        }

        let take = self.buffer.len().min(self.chunk_size);
        let rest = self.buffer.split_off(take);
        let chunk = std::mem::replace(&mut self.buffer, rest);
        Ok(Some(chunk))
    }
}
