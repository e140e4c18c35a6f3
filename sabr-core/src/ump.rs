//! UMP envelope decoding
//!
//! A UMP stream is a flat sequence of parts, each framed as
//! `varint(type) varint(size) payload[size]`. The decoder surfaces one
//! part per call and treats clean end of input between parts as normal
//! stream termination.

use crate::error::SabrError;
use crate::io::{ByteSource, ReadOutcome};
use crate::varint::VarintReader;
use bytes::Bytes;

/// Part type carried by the UMP envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UmpPartId {
    /// Metadata opening a media or init segment
    MediaHeader,
    /// Raw bytes belonging to a pending segment
    Media,
    /// Marker closing a pending segment
    MediaEnd,
    /// Live stream head and seekable-window metadata
    LiveMetadata,
    /// Server guidance for the next request
    NextRequestPolicy,
    /// Format announcement binding a format id to a mime type
    FormatInitializationMetadata,
    /// Replacement request URL
    SabrRedirect,
    /// Fatal server-side error
    SabrError,
    /// Server-directed seek
    SabrSeek,
    /// Player response reload request
    ReloadPlayerResponse,
    /// Opaque context blob to echo on future requests
    SabrContextUpdate,
    /// Attestation token status
    StreamProtectionStatus,
    /// Start/stop/discard policy for context blobs
    SabrContextSendingPolicy,
    /// Any part type this decoder does not recognize
    Unknown(u32),
}

impl UmpPartId {
    /// Map a wire part type to its identifier
    pub fn from_u32(value: u32) -> Self {
        match value {
            20 => UmpPartId::MediaHeader,
            21 => UmpPartId::Media,
            22 => UmpPartId::MediaEnd,
            31 => UmpPartId::LiveMetadata,
            35 => UmpPartId::NextRequestPolicy,
            42 => UmpPartId::FormatInitializationMetadata,
            43 => UmpPartId::SabrRedirect,
            44 => UmpPartId::SabrError,
            45 => UmpPartId::SabrSeek,
            46 => UmpPartId::ReloadPlayerResponse,
            57 => UmpPartId::SabrContextUpdate,
            58 => UmpPartId::StreamProtectionStatus,
            59 => UmpPartId::SabrContextSendingPolicy,
            other => UmpPartId::Unknown(other),
        }
    }

    /// Wire part type for this identifier
    pub fn as_u32(&self) -> u32 {
        match self {
            UmpPartId::MediaHeader => 20,
            UmpPartId::Media => 21,
            UmpPartId::MediaEnd => 22,
            UmpPartId::LiveMetadata => 31,
            UmpPartId::NextRequestPolicy => 35,
            UmpPartId::FormatInitializationMetadata => 42,
            UmpPartId::SabrRedirect => 43,
            UmpPartId::SabrError => 44,
            UmpPartId::SabrSeek => 45,
            UmpPartId::ReloadPlayerResponse => 46,
            UmpPartId::SabrContextUpdate => 57,
            UmpPartId::StreamProtectionStatus => 58,
            UmpPartId::SabrContextSendingPolicy => 59,
            UmpPartId::Unknown(other) => *other,
        }
    }
}

/// One decoded UMP part
///
/// Parts are ephemeral; the payload buffer is handed to the interpreter
/// and dropped once the part has been processed.
#[derive(Debug, Clone)]
pub struct UmpPart {
    /// Part type
    pub part_id: UmpPartId,
    /// Payload bytes, exactly `size` long
    pub data: Bytes,
}

/// Position within the framing of the part currently being decoded
#[derive(Debug)]
enum DecodeState {
    /// Reading the part type varint
    PartType(VarintReader),
    /// Reading the payload size varint
    PartSize {
        part_type: u32,
        reader: VarintReader,
    },
    /// Filling the payload buffer
    Payload {
        part_type: u32,
        payload: Vec<u8>,
        filled: usize,
    },
}

impl Default for DecodeState {
    fn default() -> Self {
        DecodeState::PartType(VarintReader::new())
    }
}

/// Streaming UMP part decoder over a byte source
#[derive(Debug)]
pub struct UmpDecoder<S> {
    source: S,
    state: DecodeState,
}

impl<S: ByteSource> UmpDecoder<S> {
    /// Create a decoder pulling from `source`
    pub fn new(source: S) -> Self {
        Self {
            source,
            state: DecodeState::default(),
        }
    }

    /// Decode the next part
    ///
    /// `Ok(None)` means the stream ended cleanly on a part boundary. End
    /// of input inside a varint or a declared payload is
    /// [`SabrError::Truncated`].
    ///
    /// A source returning [`SabrError::Interrupted`] leaves the decoder
    /// holding whatever framing bytes it had already committed; calling
    /// `decode` again resumes the same part.
    pub fn decode(&mut self) -> Result<Option<UmpPart>, SabrError> {
        loop {
            match &mut self.state {
                DecodeState::PartType(reader) => {
                    let part_type = match reader.read(&mut self.source, true)? {
                        Some(value) => value,
                        None => return Ok(None),
                    };
                    self.state = DecodeState::PartSize {
                        part_type,
                        reader: VarintReader::new(),
                    };
                }
                DecodeState::PartSize { part_type, reader } => {
                    let size = reader
                        .read(&mut self.source, false)?
                        .ok_or(SabrError::Truncated)?;
                    let part_type = *part_type;
                    self.state = DecodeState::Payload {
                        part_type,
                        payload: vec![0u8; size as usize],
                        filled: 0,
                    };
                }
                DecodeState::Payload {
                    part_type,
                    payload,
                    filled,
                } => {
                    while *filled < payload.len() {
                        match self.source.read(&mut payload[*filled..])? {
                            ReadOutcome::Bytes(n) => *filled += n,
                            ReadOutcome::EndOfInput => return Err(SabrError::Truncated),
                        }
                    }
                    let part_type = *part_type;
                    let data = Bytes::from(std::mem::take(payload));
                    self.state = DecodeState::default();
                    return Ok(Some(UmpPart {
                        part_id: UmpPartId::from_u32(part_type),
                        data,
                    }));
                }
            }
        }
    }

    /// Consume the decoder and return the underlying source
    pub fn into_source(self) -> S {
        self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::SliceSource;
    use crate::varint::encode_varint;
    use bytes::BytesMut;

    fn frame_part(part_type: u32, payload: &[u8], buf: &mut BytesMut) {
        encode_varint(part_type, buf);
        encode_varint(payload.len() as u32, buf);
        buf.extend_from_slice(payload);
    }

    #[test]
    fn test_decode_parts_until_clean_end() {
        let mut buf = BytesMut::new();
        frame_part(21, &[1, 2, 3], &mut buf);
        frame_part(22, &[7], &mut buf);
        frame_part(999, &[0; 16], &mut buf);

        let mut decoder = UmpDecoder::new(SliceSource::new(buf.freeze()));

        let part = decoder.decode().unwrap().unwrap();
        assert_eq!(part.part_id, UmpPartId::Media);
        assert_eq!(part.data.as_ref(), &[1, 2, 3]);

        let part = decoder.decode().unwrap().unwrap();
        assert_eq!(part.part_id, UmpPartId::MediaEnd);

        let part = decoder.decode().unwrap().unwrap();
        assert_eq!(part.part_id, UmpPartId::Unknown(999));
        assert_eq!(part.data.len(), 16);

        assert!(decoder.decode().unwrap().is_none());
        // The decoder keeps reporting end of stream once exhausted.
        assert!(decoder.decode().unwrap().is_none());
    }

    #[test]
    fn test_truncated_payload_is_an_error() {
        let mut buf = BytesMut::new();
        encode_varint(21, &mut buf);
        encode_varint(10, &mut buf);
        buf.extend_from_slice(&[0; 4]);

        let mut decoder = UmpDecoder::new(SliceSource::new(buf.freeze()));
        let err = decoder.decode().unwrap_err();
        assert!(matches!(err, SabrError::Truncated));
    }

    #[test]
    fn test_missing_size_varint_is_an_error() {
        let mut buf = BytesMut::new();
        encode_varint(21, &mut buf);

        let mut decoder = UmpDecoder::new(SliceSource::new(buf.freeze()));
        let err = decoder.decode().unwrap_err();
        assert!(matches!(err, SabrError::Truncated));
    }

    /// Source that delivers bytes up to a fixed position, interrupts
    /// once, then serves the remainder normally
    struct InterruptingSource {
        inner: SliceSource,
        interrupt_at: usize,
        delivered: usize,
        fired: bool,
    }

    impl InterruptingSource {
        fn new(data: bytes::Bytes, interrupt_at: usize) -> Self {
            Self {
                inner: SliceSource::new(data),
                interrupt_at,
                delivered: 0,
                fired: false,
            }
        }
    }

    impl ByteSource for InterruptingSource {
        fn read(&mut self, dst: &mut [u8]) -> Result<crate::io::ReadOutcome, SabrError> {
            if !self.fired {
                if self.delivered >= self.interrupt_at {
                    self.fired = true;
                    return Err(SabrError::Interrupted);
                }
                let cap = (self.interrupt_at - self.delivered).min(dst.len());
                let outcome = self.inner.read(&mut dst[..cap])?;
                if let crate::io::ReadOutcome::Bytes(n) = outcome {
                    self.delivered += n;
                }
                return Ok(outcome);
            }
            self.inner.read(dst)
        }
    }

    #[test]
    fn test_interrupt_mid_payload_resumes_same_part() {
        let mut buf = BytesMut::new();
        frame_part(21, &[1, 2, 3, 4, 5, 6], &mut buf);
        frame_part(22, &[7], &mut buf);

        // Two framing bytes, then interrupt after 3 of the 6 payload bytes.
        let mut decoder = UmpDecoder::new(InterruptingSource::new(buf.freeze(), 5));

        let err = decoder.decode().unwrap_err();
        assert!(matches!(err, SabrError::Interrupted));

        let part = decoder.decode().unwrap().unwrap();
        assert_eq!(part.part_id, UmpPartId::Media);
        assert_eq!(part.data.as_ref(), &[1, 2, 3, 4, 5, 6]);

        let part = decoder.decode().unwrap().unwrap();
        assert_eq!(part.part_id, UmpPartId::MediaEnd);
        assert_eq!(part.data.as_ref(), &[7]);

        assert!(decoder.decode().unwrap().is_none());
    }

    #[test]
    fn test_interrupt_mid_varint_resumes_same_part() {
        let mut buf = BytesMut::new();
        // Part type 300 encodes as two bytes; interrupt between them.
        frame_part(300, &[9], &mut buf);

        let mut decoder = UmpDecoder::new(InterruptingSource::new(buf.freeze(), 1));

        let err = decoder.decode().unwrap_err();
        assert!(matches!(err, SabrError::Interrupted));

        let part = decoder.decode().unwrap().unwrap();
        assert_eq!(part.part_id, UmpPartId::Unknown(300));
        assert_eq!(part.data.as_ref(), &[9]);
    }

    #[test]
    fn test_empty_payload_part() {
        let mut buf = BytesMut::new();
        frame_part(58, &[], &mut buf);

        let mut decoder = UmpDecoder::new(SliceSource::new(buf.freeze()));
        let part = decoder.decode().unwrap().unwrap();
        assert_eq!(part.part_id, UmpPartId::StreamProtectionStatus);
        assert!(part.data.is_empty());
    }
}
