//! Capped in-memory capture for the string path.
//!
//! The buffer reserves its whole ceiling up front and never grows past it.
//! Chunks beyond the ceiling are dropped, but the sink still reports them as
//! consumed so the transfer runs to completion; the loss shows up in
//! `CapturedBody::truncated` instead of aborting the request.

use crate::error::TaskError;
use crate::transport::ChunkSink;

/// Fixed-ceiling byte collector fed by the transport.
#[derive(Debug)]
pub struct CaptureBuffer {
    data: Vec<u8>,
    ceiling: usize,
    offered: u64,
}

impl CaptureBuffer {
    /// Reserve a buffer of exactly `ceiling` bytes.
    pub fn with_ceiling(ceiling: usize) -> Result<Self, TaskError> {
        let mut data = Vec::new();
        data.try_reserve_exact(ceiling)
            .map_err(|_| TaskError::AllocationFailed { requested: ceiling })?;
        Ok(Self {
            data,
            ceiling,
            offered: 0,
        })
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Bytes physically stored so far.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes the transport delivered, stored or not.
    pub fn offered(&self) -> u64 {
        self.offered
    }

    fn remaining(&self) -> usize {
        self.ceiling - self.data.len()
    }

    /// Close the buffer. At most `ceiling - 1` bytes survive; the last slot
    /// belongs to the terminator C callers receive.
    pub fn finish(mut self) -> CapturedBody {
        let keep = self.data.len().min(self.ceiling.saturating_sub(1));
        self.data.truncate(keep);
        CapturedBody {
            truncated: self.offered > keep as u64,
            bytes: self.data,
        }
    }
}

impl ChunkSink for CaptureBuffer {
    fn write_chunk(&mut self, chunk: &[u8]) -> usize {
        let copy = chunk.len().min(self.remaining());
        self.data.extend_from_slice(&chunk[..copy]);
        self.offered += chunk.len() as u64;
        chunk.len()
    }
}

/// Result of a finished memory capture.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CapturedBody {
    pub bytes: Vec<u8>,
    /// Set when the server sent more than the buffer could keep.
    pub truncated: bool,
}

impl CapturedBody {
    /// The captured bytes up to the first NUL, the way a C string reader
    /// would see them, decoded lossily.
    pub fn as_text(&self) -> std::borrow::Cow<'_, str> {
        let end = self
            .bytes
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(self.bytes.len());
        String::from_utf8_lossy(&self.bytes[..end])
    }
}
