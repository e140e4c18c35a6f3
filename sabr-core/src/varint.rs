//! UMP variable-length integer encoding
//!
//! The first byte selects the total length: values below 128 are one
//! byte, below 192 two, below 224 three, below 240 four, anything else
//! five. For lengths below five the first byte contributes its low
//! `8 - length` bits and each following byte is OR'd in at the next
//! higher shift. A five-byte varint discards the first byte entirely and
//! carries the value in the next four bytes, least significant first.

use crate::error::SabrError;
use crate::io::ByteSource;
use bytes::{Buf, BufMut, BytesMut};
use std::io::Cursor;

/// Total encoded length implied by the first byte
fn varint_len(first_byte: u8) -> usize {
    match first_byte {
        0..=127 => 1,
        128..=191 => 2,
        192..=223 => 3,
        224..=239 => 4,
        _ => 5,
    }
}

/// Encode a variable-length integer
pub fn encode_varint(value: u32, buf: &mut BytesMut) {
    if value < 1 << 7 {
        buf.put_u8(value as u8);
    } else if value < 1 << 14 {
        buf.put_u8(0x80 | (value & 0x3F) as u8);
        buf.put_u8((value >> 6) as u8);
    } else if value < 1 << 21 {
        buf.put_u8(0xC0 | (value & 0x1F) as u8);
        buf.put_u8((value >> 5) as u8);
        buf.put_u8((value >> 13) as u8);
    } else if value < 1 << 28 {
        buf.put_u8(0xE0 | (value & 0x0F) as u8);
        buf.put_u8((value >> 4) as u8);
        buf.put_u8((value >> 12) as u8);
        buf.put_u8((value >> 20) as u8);
    } else {
        buf.put_u8(0xF0);
        buf.put_u32_le(value);
    }
}

/// Assemble a value from its first byte and the remaining encoded bytes
fn assemble(first_byte: u8, rest: &[u8]) -> u32 {
    let len = rest.len() + 1;
    if len == 5 {
        // First byte is a marker only; value is four bytes LE.
        return u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]);
    }
    let low_bits = 8 - len;
    let mut value = (first_byte & ((1u16 << low_bits) - 1) as u8) as u32;
    let mut shift = low_bits as u32;
    for &b in rest {
        value |= (b as u32) << shift;
        shift += 8;
    }
    value
}

/// Decode a variable-length integer from an in-memory buffer
pub fn decode_varint(buf: &mut Cursor<&[u8]>) -> Result<u32, SabrError> {
    if !buf.has_remaining() {
        return Err(SabrError::Truncated);
    }
    let first_byte = buf.get_u8();
    let extra = varint_len(first_byte) - 1;
    if buf.remaining() < extra {
        return Err(SabrError::Truncated);
    }
    let mut rest = [0u8; 4];
    buf.copy_to_slice(&mut rest[..extra]);
    Ok(assemble(first_byte, &rest[..extra]))
}

/// Incremental varint reader over a byte source
///
/// Committed bytes are kept across calls, so a source that returns
/// [`SabrError::Interrupted`] partway through a value can be retried
/// without losing or reparsing anything. The reader clears itself once
/// a value completes and can be reused for the next one.
#[derive(Debug, Default)]
pub struct VarintReader {
    first: Option<u8>,
    rest: [u8; 4],
    have: usize,
}

impl VarintReader {
    /// Create an empty reader
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any byte of the current value has been committed
    pub fn in_progress(&self) -> bool {
        self.first.is_some()
    }

    /// Read the value, resuming any partial progress
    ///
    /// Returns `Ok(None)` when the source ends cleanly before the first
    /// byte and `allow_end_of_input` is set. End of input after the
    /// first byte of a multi-byte varint is [`SabrError::Truncated`].
    pub fn read<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
        allow_end_of_input: bool,
    ) -> Result<Option<u32>, SabrError> {
        let first = match self.first {
            Some(byte) => byte,
            None => {
                let mut byte = [0u8; 1];
                if !source.read_fully(&mut byte, allow_end_of_input)? {
                    return Ok(None);
                }
                self.first = Some(byte[0]);
                byte[0]
            }
        };
        let extra = varint_len(first) - 1;
        while self.have < extra {
            let mut byte = [0u8; 1];
            source.read_fully(&mut byte, false)?;
            self.rest[self.have] = byte[0];
            self.have += 1;
        }
        let value = assemble(first, &self.rest[..extra]);
        *self = Self::default();
        Ok(Some(value))
    }
}

/// Decode a variable-length integer from a byte source in one call
///
/// Returns `Ok(None)` when the source ends cleanly before the first byte
/// and `allow_end_of_input` is set. End of input after the first byte of
/// a multi-byte varint is [`SabrError::Truncated`].
pub fn read_varint<S: ByteSource + ?Sized>(
    source: &mut S,
    allow_end_of_input: bool,
) -> Result<Option<u32>, SabrError> {
    VarintReader::new().read(source, allow_end_of_input)
}
