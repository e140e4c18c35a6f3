//! SABR part payload encoding
//!
//! Every SABR part body is a flat field sequence built from the same UMP
//! varint used by the envelope. Optional fields carry a one-byte presence
//! marker (varint `1` followed by the value, or varint `0`); strings and
//! opaque blobs are length-prefixed. Each message has a paired
//! `encode`/`decode` so callers can both parse server streams and
//! fabricate them in tests.

use crate::error::SabrError;
use crate::varint::{decode_varint, encode_varint};
use bytes::{Buf, Bytes, BytesMut};
use std::io::Cursor;

fn encode_optional(value: Option<u32>, buf: &mut BytesMut) {
    match value {
        Some(v) => {
            encode_varint(1, buf);
            encode_varint(v, buf);
        }
        None => encode_varint(0, buf),
    }
}

fn decode_optional(buf: &mut Cursor<&[u8]>) -> Result<Option<u32>, SabrError> {
    match decode_varint(buf)? {
        0 => Ok(None),
        1 => Ok(Some(decode_varint(buf)?)),
        other => Err(SabrError::Protocol {
            reason: format!("Invalid presence marker: {}", other),
        }),
    }
}

fn encode_bool(value: bool, buf: &mut BytesMut) {
    encode_varint(u32::from(value), buf);
}

fn decode_bool(buf: &mut Cursor<&[u8]>) -> Result<bool, SabrError> {
    match decode_varint(buf)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(SabrError::Protocol {
            reason: format!("Invalid boolean value: {}", other),
        }),
    }
}

fn encode_blob(data: &[u8], buf: &mut BytesMut) {
    encode_varint(data.len() as u32, buf);
    buf.extend_from_slice(data);
}

fn decode_blob(buf: &mut Cursor<&[u8]>) -> Result<Bytes, SabrError> {
    let len = decode_varint(buf)? as usize;
    if buf.remaining() < len {
        return Err(SabrError::Truncated);
    }
    let mut data = vec![0u8; len];
    buf.copy_to_slice(&mut data);
    Ok(Bytes::from(data))
}

fn encode_string(value: &str, buf: &mut BytesMut) {
    encode_blob(value.as_bytes(), buf);
}

fn decode_string(buf: &mut Cursor<&[u8]>) -> Result<String, SabrError> {
    let data = decode_blob(buf)?;
    String::from_utf8(data.to_vec()).map_err(|_| SabrError::Protocol {
        reason: "Invalid UTF-8 in string field".to_string(),
    })
}

/// Metadata opening a media or init segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaHeader {
    /// Header id linking subsequent media parts to this segment
    pub header_id: u32,
    /// Format the segment belongs to
    pub format_id: u32,
    /// Whether this segment carries initialization data
    pub is_init_segment: bool,
    /// Whether the payload is compressed (unsupported)
    pub compressed: bool,
    /// Position of the segment within its format
    pub sequence_number: Option<u32>,
    /// Playback duration of the segment in milliseconds
    pub duration_ms: Option<u32>,
    /// Presentation start time in milliseconds
    pub start_time_ms: Option<u32>,
    /// Total payload size in bytes, when declared
    pub content_length: Option<u32>,
    /// Byte offset of the segment within the format resource
    pub start_data_range: Option<u32>,
    /// Highest sequence number the format will ever carry
    pub sequence_limit: Option<u32>,
    /// Average bitrate of the format in bits per second
    pub bitrate_bps: Option<u32>,
}

impl MediaHeader {
    /// Encode this header as a part payload
    pub fn encode(&self, buf: &mut BytesMut) {
        encode_varint(self.header_id, buf);
        encode_varint(self.format_id, buf);
        encode_bool(self.is_init_segment, buf);
        encode_bool(self.compressed, buf);
        encode_optional(self.sequence_number, buf);
        encode_optional(self.duration_ms, buf);
        encode_optional(self.start_time_ms, buf);
        encode_optional(self.content_length, buf);
        encode_optional(self.start_data_range, buf);
        encode_optional(self.sequence_limit, buf);
        encode_optional(self.bitrate_bps, buf);
    }

    /// Decode a header from a part payload
    pub fn decode(data: &[u8]) -> Result<Self, SabrError> {
        let mut buf = Cursor::new(data);
        Ok(Self {
            header_id: decode_varint(&mut buf)?,
            format_id: decode_varint(&mut buf)?,
            is_init_segment: decode_bool(&mut buf)?,
            compressed: decode_bool(&mut buf)?,
            sequence_number: decode_optional(&mut buf)?,
            duration_ms: decode_optional(&mut buf)?,
            start_time_ms: decode_optional(&mut buf)?,
            content_length: decode_optional(&mut buf)?,
            start_data_range: decode_optional(&mut buf)?,
            sequence_limit: decode_optional(&mut buf)?,
            bitrate_bps: decode_optional(&mut buf)?,
        })
    }
}

/// Media part payload: header id followed by raw segment bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaData {
    /// Header id of the pending segment this chunk belongs to
    pub header_id: u32,
    /// Raw segment bytes
    pub data: Bytes,
}

impl MediaData {
    /// Encode this chunk as a part payload
    pub fn encode(&self, buf: &mut BytesMut) {
        encode_varint(self.header_id, buf);
        buf.extend_from_slice(&self.data);
    }

    /// Decode a chunk from a part payload
    pub fn decode(data: &Bytes) -> Result<Self, SabrError> {
        let mut buf = Cursor::new(data.as_ref());
        let header_id = decode_varint(&mut buf)?;
        let offset = buf.position() as usize;
        Ok(Self {
            header_id,
            data: data.slice(offset..),
        })
    }
}

/// Media end payload: the header id of the segment being closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaEnd {
    /// Header id of the segment being closed
    pub header_id: u32,
}

impl MediaEnd {
    /// Encode this marker as a part payload
    pub fn encode(&self, buf: &mut BytesMut) {
        encode_varint(self.header_id, buf);
    }

    /// Decode a marker from a part payload
    pub fn decode(data: &[u8]) -> Result<Self, SabrError> {
        let mut buf = Cursor::new(data);
        Ok(Self {
            header_id: decode_varint(&mut buf)?,
        })
    }
}

/// Format announcement binding a format id to a mime type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatInitMetadata {
    /// Format id used by later media headers
    pub format_id: u32,
    /// Full mime type, codec parameter included
    pub mime_type: String,
    /// Presentation end time in milliseconds
    pub end_time_ms: Option<u32>,
    /// Total number of media segments, when known up front
    pub total_segments: Option<u32>,
    /// Total duration in milliseconds
    pub duration_ms: Option<u32>,
}

impl FormatInitMetadata {
    /// Encode this announcement as a part payload
    pub fn encode(&self, buf: &mut BytesMut) {
        encode_varint(self.format_id, buf);
        encode_string(&self.mime_type, buf);
        encode_optional(self.end_time_ms, buf);
        encode_optional(self.total_segments, buf);
        encode_optional(self.duration_ms, buf);
    }

    /// Decode an announcement from a part payload
    pub fn decode(data: &[u8]) -> Result<Self, SabrError> {
        let mut buf = Cursor::new(data);
        Ok(Self {
            format_id: decode_varint(&mut buf)?,
            mime_type: decode_string(&mut buf)?,
            end_time_ms: decode_optional(&mut buf)?,
            total_segments: decode_optional(&mut buf)?,
            duration_ms: decode_optional(&mut buf)?,
        })
    }
}

/// Attestation state reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionStatus {
    /// No attestation problem
    Ok,
    /// Attestation is being evaluated
    AttestationPending,
    /// A valid attestation token is required to continue
    AttestationRequired,
}

/// Stream protection status payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamProtectionStatus {
    /// Reported attestation state
    pub status: ProtectionStatus,
}

impl StreamProtectionStatus {
    /// Encode this status as a part payload
    pub fn encode(&self, buf: &mut BytesMut) {
        let code = match self.status {
            ProtectionStatus::Ok => 1,
            ProtectionStatus::AttestationPending => 2,
            ProtectionStatus::AttestationRequired => 3,
        };
        encode_varint(code, buf);
    }

    /// Decode a status from a part payload
    pub fn decode(data: &[u8]) -> Result<Self, SabrError> {
        let mut buf = Cursor::new(data);
        let status = match decode_varint(&mut buf)? {
            1 => ProtectionStatus::Ok,
            2 => ProtectionStatus::AttestationPending,
            3 => ProtectionStatus::AttestationRequired,
            other => {
                return Err(SabrError::Protocol {
                    reason: format!("Unknown protection status: {}", other),
                })
            }
        };
        Ok(Self { status })
    }
}

/// Server-directed seek payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SabrSeek {
    /// Seek target in ticks
    pub seek_time_ticks: u32,
    /// Ticks per second
    pub timescale: u32,
}

impl SabrSeek {
    /// Seek target in milliseconds
    pub fn seek_time_ms(&self) -> u64 {
        if self.timescale == 0 {
            return 0;
        }
        u64::from(self.seek_time_ticks) * 1000 / u64::from(self.timescale)
    }

    /// Encode this seek as a part payload
    pub fn encode(&self, buf: &mut BytesMut) {
        encode_varint(self.seek_time_ticks, buf);
        encode_varint(self.timescale, buf);
    }

    /// Decode a seek from a part payload
    pub fn decode(data: &[u8]) -> Result<Self, SabrError> {
        let mut buf = Cursor::new(data);
        Ok(Self {
            seek_time_ticks: decode_varint(&mut buf)?,
            timescale: decode_varint(&mut buf)?,
        })
    }
}

/// Live stream head and seekable-window metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveMetadata {
    /// Sequence number at the live head
    pub head_sequence_number: Option<u32>,
    /// Presentation time of the live head in milliseconds
    pub head_sequence_time_ms: Option<u32>,
    /// Earliest seekable position in ticks
    pub min_seekable_time_ticks: Option<u32>,
    /// Timescale for the earliest seekable position
    pub min_seekable_timescale: Option<u32>,
    /// Target segment duration in seconds
    pub target_segment_duration_sec: Option<u32>,
}

impl LiveMetadata {
    /// Earliest seekable position in milliseconds, when both fields are present
    pub fn min_seekable_time_ms(&self) -> Option<u64> {
        let ticks = self.min_seekable_time_ticks?;
        let timescale = self.min_seekable_timescale?;
        if timescale == 0 {
            return None;
        }
        Some(u64::from(ticks) * 1000 / u64::from(timescale))
    }

    /// Encode this metadata as a part payload
    pub fn encode(&self, buf: &mut BytesMut) {
        encode_optional(self.head_sequence_number, buf);
        encode_optional(self.head_sequence_time_ms, buf);
        encode_optional(self.min_seekable_time_ticks, buf);
        encode_optional(self.min_seekable_timescale, buf);
        encode_optional(self.target_segment_duration_sec, buf);
    }

    /// Decode metadata from a part payload
    pub fn decode(data: &[u8]) -> Result<Self, SabrError> {
        let mut buf = Cursor::new(data);
        Ok(Self {
            head_sequence_number: decode_optional(&mut buf)?,
            head_sequence_time_ms: decode_optional(&mut buf)?,
            min_seekable_time_ticks: decode_optional(&mut buf)?,
            min_seekable_timescale: decode_optional(&mut buf)?,
            target_segment_duration_sec: decode_optional(&mut buf)?,
        })
    }
}

/// Player response reload request payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadPlayerResponse {
    /// Opaque token to echo on the reload request
    pub reload_token: Option<Bytes>,
}

impl ReloadPlayerResponse {
    /// Encode this request as a part payload
    pub fn encode(&self, buf: &mut BytesMut) {
        match &self.reload_token {
            Some(token) => {
                encode_varint(1, buf);
                encode_blob(token, buf);
            }
            None => encode_varint(0, buf),
        }
    }

    /// Decode a request from a part payload
    pub fn decode(data: &[u8]) -> Result<Self, SabrError> {
        let mut buf = Cursor::new(data);
        let reload_token = match decode_varint(&mut buf)? {
            0 => None,
            1 => Some(decode_blob(&mut buf)?),
            other => {
                return Err(SabrError::Protocol {
                    reason: format!("Invalid presence marker: {}", other),
                })
            }
        };
        Ok(Self { reload_token })
    }
}

/// Server guidance for the next request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextRequestPolicy {
    /// Minimum delay before the next request in milliseconds
    pub backoff_time_ms: Option<u32>,
}

impl NextRequestPolicy {
    /// Encode this policy as a part payload
    pub fn encode(&self, buf: &mut BytesMut) {
        encode_optional(self.backoff_time_ms, buf);
    }

    /// Decode a policy from a part payload
    pub fn decode(data: &[u8]) -> Result<Self, SabrError> {
        let mut buf = Cursor::new(data);
        Ok(Self {
            backoff_time_ms: decode_optional(&mut buf)?,
        })
    }
}

/// Replacement request URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SabrRedirect {
    /// URL all further requests should target
    pub redirect_url: String,
}

impl SabrRedirect {
    /// Encode this redirect as a part payload
    pub fn encode(&self, buf: &mut BytesMut) {
        encode_string(&self.redirect_url, buf);
    }

    /// Decode a redirect from a part payload
    pub fn decode(data: &[u8]) -> Result<Self, SabrError> {
        let mut buf = Cursor::new(data);
        Ok(Self {
            redirect_url: decode_string(&mut buf)?,
        })
    }
}

/// Fatal server-side error payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SabrErrorPart {
    /// Error category reported by the server
    pub error_type: String,
    /// Numeric error code, when provided
    pub code: Option<u32>,
}

impl SabrErrorPart {
    /// Encode this error as a part payload
    pub fn encode(&self, buf: &mut BytesMut) {
        encode_string(&self.error_type, buf);
        encode_optional(self.code, buf);
    }

    /// Decode an error from a part payload
    pub fn decode(data: &[u8]) -> Result<Self, SabrError> {
        let mut buf = Cursor::new(data);
        Ok(Self {
            error_type: decode_string(&mut buf)?,
            code: decode_optional(&mut buf)?,
        })
    }
}

/// Write behavior when a context of the same type already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextWritePolicy {
    /// Replace any stored value
    Overwrite,
    /// Keep the stored value and drop this update
    KeepExisting,
}

/// Opaque context blob to echo on future requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SabrContextUpdate {
    /// Context type the blob is keyed by
    pub context_type: u32,
    /// Opaque value to store
    pub value: Bytes,
    /// Behavior when a value of this type already exists
    pub write_policy: ContextWritePolicy,
    /// Whether the blob should be sent without an explicit start policy
    pub send_by_default: bool,
}

impl SabrContextUpdate {
    /// Encode this update as a part payload
    pub fn encode(&self, buf: &mut BytesMut) {
        encode_varint(self.context_type, buf);
        encode_blob(&self.value, buf);
        let policy = match self.write_policy {
            ContextWritePolicy::Overwrite => 1,
            ContextWritePolicy::KeepExisting => 2,
        };
        encode_varint(policy, buf);
        encode_bool(self.send_by_default, buf);
    }

    /// Decode an update from a part payload
    pub fn decode(data: &[u8]) -> Result<Self, SabrError> {
        let mut buf = Cursor::new(data);
        let context_type = decode_varint(&mut buf)?;
        let value = decode_blob(&mut buf)?;
        let write_policy = match decode_varint(&mut buf)? {
            1 => ContextWritePolicy::Overwrite,
            2 => ContextWritePolicy::KeepExisting,
            other => {
                return Err(SabrError::Protocol {
                    reason: format!("Unknown context write policy: {}", other),
                })
            }
        };
        Ok(Self {
            context_type,
            value,
            write_policy,
            send_by_default: decode_bool(&mut buf)?,
        })
    }
}

/// Start/stop/discard policy for context blobs
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SabrContextSendingPolicy {
    /// Context types to start sending
    pub start: Vec<u32>,
    /// Context types to stop sending
    pub stop: Vec<u32>,
    /// Context types to drop entirely
    pub discard: Vec<u32>,
}

impl SabrContextSendingPolicy {
    fn encode_list(list: &[u32], buf: &mut BytesMut) {
        encode_varint(list.len() as u32, buf);
        for &value in list {
            encode_varint(value, buf);
        }
    }

    fn decode_list(buf: &mut Cursor<&[u8]>) -> Result<Vec<u32>, SabrError> {
        let len = decode_varint(buf)? as usize;
        let mut list = Vec::with_capacity(len);
        for _ in 0..len {
            list.push(decode_varint(buf)?);
        }
        Ok(list)
    }

    /// Encode this policy as a part payload
    pub fn encode(&self, buf: &mut BytesMut) {
        Self::encode_list(&self.start, buf);
        Self::encode_list(&self.stop, buf);
        Self::encode_list(&self.discard, buf);
    }

    /// Decode a policy from a part payload
    pub fn decode(data: &[u8]) -> Result<Self, SabrError> {
        let mut buf = Cursor::new(data);
        Ok(Self {
            start: Self::decode_list(&mut buf)?,
            stop: Self::decode_list(&mut buf)?,
            discard: Self::decode_list(&mut buf)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_header_roundtrip() {
        let header = MediaHeader {
            header_id: 7,
            format_id: 140,
            is_init_segment: false,
            compressed: false,
            sequence_number: Some(12),
            duration_ms: Some(5120),
            start_time_ms: Some(61440),
            content_length: Some(98304),
            start_data_range: None,
            sequence_limit: Some(200),
            bitrate_bps: None,
        };
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(MediaHeader::decode(&buf).unwrap(), header);
    }

    #[test]
    fn test_media_data_splits_header_id_from_payload() {
        let chunk = MediaData {
            header_id: 300,
            data: Bytes::from_static(&[9, 8, 7]),
        };
        let mut buf = BytesMut::new();
        chunk.encode(&mut buf);
        let decoded = MediaData::decode(&buf.freeze()).unwrap();
        assert_eq!(decoded.header_id, 300);
        assert_eq!(decoded.data.as_ref(), &[9, 8, 7]);
    }

    #[test]
    fn test_format_init_metadata_roundtrip() {
        let meta = FormatInitMetadata {
            format_id: 248,
            mime_type: "video/webm; codecs=\"vp9\"".to_string(),
            end_time_ms: None,
            total_segments: Some(120),
            duration_ms: Some(614_400),
        };
        let mut buf = BytesMut::new();
        meta.encode(&mut buf);
        assert_eq!(FormatInitMetadata::decode(&buf).unwrap(), meta);
    }

    #[test]
    fn test_protection_status_rejects_unknown_code() {
        let mut buf = BytesMut::new();
        encode_varint(9, &mut buf);
        assert!(StreamProtectionStatus::decode(&buf).is_err());
    }

    #[test]
    fn test_sabr_seek_time_conversion() {
        let seek = SabrSeek {
            seek_time_ticks: 90_000,
            timescale: 1000,
        };
        assert_eq!(seek.seek_time_ms(), 90_000);

        let seek = SabrSeek {
            seek_time_ticks: 90_000,
            timescale: 90,
        };
        assert_eq!(seek.seek_time_ms(), 1_000_000);
    }

    #[test]
    fn test_context_update_roundtrip() {
        let update = SabrContextUpdate {
            context_type: 3,
            value: Bytes::from_static(b"opaque"),
            write_policy: ContextWritePolicy::KeepExisting,
            send_by_default: true,
        };
        let mut buf = BytesMut::new();
        update.encode(&mut buf);
        assert_eq!(SabrContextUpdate::decode(&buf).unwrap(), update);
    }

    #[test]
    fn test_sending_policy_roundtrip() {
        let policy = SabrContextSendingPolicy {
            start: vec![1, 2],
            stop: vec![3],
            discard: vec![],
        };
        let mut buf = BytesMut::new();
        policy.encode(&mut buf);
        assert_eq!(SabrContextSendingPolicy::decode(&buf).unwrap(), policy);
    }

    #[test]
    fn test_reload_player_response_without_token() {
        let reload = ReloadPlayerResponse { reload_token: None };
        let mut buf = BytesMut::new();
        reload.encode(&mut buf);
        assert_eq!(ReloadPlayerResponse::decode(&buf).unwrap(), reload);
    }
}
