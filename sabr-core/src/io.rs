//! Byte source abstraction for pull-based stream decoding
//!
//! The decoder pulls bytes through [`ByteSource`] rather than owning a
//! transport. Clean end of input is reported in-band through
//! [`ReadOutcome::EndOfInput`]; a source that wants to suspend decoding
//! returns [`SabrError::Interrupted`] and may be polled again later.

use crate::error::SabrError;
use bytes::Bytes;

/// Result of a single read call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Number of bytes written into the destination, always non-zero
    Bytes(usize),
    /// The source has no further bytes
    EndOfInput,
}

/// Pull-based byte source feeding the UMP decoder
pub trait ByteSource {
    /// Read up to `dst.len()` bytes into `dst`
    fn read(&mut self, dst: &mut [u8]) -> Result<ReadOutcome, SabrError>;

    /// Fill `dst` completely
    ///
    /// Returns `Ok(false)` when the source ends before the first byte and
    /// `allow_end_of_input` is set. End of input after at least one byte
    /// has been committed is [`SabrError::Truncated`].
    fn read_fully(&mut self, dst: &mut [u8], allow_end_of_input: bool) -> Result<bool, SabrError> {
        let mut filled = 0;
        while filled < dst.len() {
            match self.read(&mut dst[filled..])? {
                ReadOutcome::Bytes(n) => filled += n,
                ReadOutcome::EndOfInput => {
                    if allow_end_of_input && filled == 0 {
                        return Ok(false);
                    }
                    return Err(SabrError::Truncated);
                }
            }
        }
        Ok(true)
    }

    /// Discard exactly `len` bytes
    fn skip_fully(&mut self, len: usize) -> Result<(), SabrError> {
        let mut scratch = [0u8; 256];
        let mut remaining = len;
        while remaining > 0 {
            let take = remaining.min(scratch.len());
            match self.read(&mut scratch[..take])? {
                ReadOutcome::Bytes(n) => remaining -= n,
                ReadOutcome::EndOfInput => return Err(SabrError::Truncated),
            }
        }
        Ok(())
    }
}

/// In-memory byte source over an owned buffer
#[derive(Debug, Clone)]
pub struct SliceSource {
    data: Bytes,
    pos: usize,
}

impl SliceSource {
    /// Create a source over `data`, positioned at the first byte
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
        }
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

impl ByteSource for SliceSource {
    fn read(&mut self, dst: &mut [u8]) -> Result<ReadOutcome, SabrError> {
        if self.pos == self.data.len() {
            return Ok(ReadOutcome::EndOfInput);
        }
        let n = dst.len().min(self.data.len() - self.pos);
        dst[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(ReadOutcome::Bytes(n))
    }
}

/// Wrapper bounding reads to a single data chunk
///
/// Container parsers are handed one of these per segment-data chunk so a
/// misbehaving parser cannot read across the chunk boundary into the next
/// UMP part. The wrapper reports [`ReadOutcome::EndOfInput`] once the
/// budget is spent.
pub struct LimitedSource<'a> {
    inner: &'a mut dyn ByteSource,
    remaining: u64,
}

impl<'a> LimitedSource<'a> {
    /// Bound `inner` to at most `limit` further bytes
    pub fn new(inner: &'a mut dyn ByteSource, limit: u64) -> Self {
        Self {
            inner,
            remaining: limit,
        }
    }

    /// Bytes still available inside the bound
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl ByteSource for LimitedSource<'_> {
    fn read(&mut self, dst: &mut [u8]) -> Result<ReadOutcome, SabrError> {
        if self.remaining == 0 {
            return Ok(ReadOutcome::EndOfInput);
        }
        let take = (dst.len() as u64).min(self.remaining) as usize;
        match self.inner.read(&mut dst[..take])? {
            ReadOutcome::Bytes(n) => {
                self.remaining -= n as u64;
                Ok(ReadOutcome::Bytes(n))
            }
            ReadOutcome::EndOfInput => Ok(ReadOutcome::EndOfInput),
        }
    }
}
