//! Container parser adaptation
//!
//! Formats that ship in container boxes rather than raw elementary
//! streams go through an external [`ContainerParser`]. The adapter owns
//! the parser by composition and, for each segment-data chunk, binds a
//! [`LimitedSource`] around the session's byte source so the parser can
//! never read past the chunk boundary. The bound is released on every
//! exit path, error included, because the wrapper lives only for the
//! duration of the call.

use crate::error::MediaError;
use sabr_core::io::{ByteSource, LimitedSource};
use tracing::warn;

/// What a container parser did with the bytes offered to it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    /// Progress was made and the parser wants to be called again
    Continue,
    /// The chunk is exhausted; more data is needed to proceed
    NeedMoreData,
    /// The parser reached the end of its container structure
    Finished,
}

/// External container box parser
///
/// Implementations carry their own track state; the adapter only drives
/// the read loop and enforces the chunk boundary.
pub trait ContainerParser {
    /// Consume bytes from the bounded input
    fn read(&mut self, input: &mut LimitedSource<'_>) -> Result<ParseOutcome, MediaError>;
}

/// Chunk-bounded driver around a [`ContainerParser`]
#[derive(Debug)]
pub struct ContainerAdapter<P> {
    parser: P,
}

impl<P: ContainerParser> ContainerAdapter<P> {
    /// Wrap a parser
    pub fn new(parser: P) -> Self {
        Self { parser }
    }

    /// The wrapped parser
    pub fn parser(&self) -> &P {
        &self.parser
    }

    /// Offer one segment-data chunk of `len` bytes to the parser
    ///
    /// Calls the parser until it stops reporting [`ParseOutcome::Continue`].
    /// A parser that continues without consuming would leave the rest of
    /// the chunk to be misread as UMP framing, so the stall is
    /// [`MediaError::ContainerStalled`] rather than a spin.
    pub fn feed(
        &mut self,
        source: &mut dyn ByteSource,
        len: u64,
    ) -> Result<ParseOutcome, MediaError> {
        let mut limited = LimitedSource::new(source, len);
        loop {
            let before = limited.remaining();
            match self.parser.read(&mut limited)? {
                ParseOutcome::Continue => {
                    if limited.remaining() == before {
                        warn!(remaining = before, "Container parser made no progress");
                        return Err(MediaError::ContainerStalled { remaining: before });
                    }
                }
                outcome => return Ok(outcome),
            }
        }
    }
}
