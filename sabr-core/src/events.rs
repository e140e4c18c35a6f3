//! Typed session events
//!
//! The interpreter turns raw UMP parts into these events. The enum is
//! closed on purpose: consumers match exhaustively and the compiler
//! flags every call site when a variant is added.

use crate::selector::{FormatId, FormatSelector};
use bytes::Bytes;
use std::sync::Arc;

/// Why the playback position moved without the caller asking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekReason {
    /// The server directed a seek
    ServerSeek,
    /// Playback resumed past already-delivered segments
    ConsumedSeek,
}

/// Why the caller must refresh its player response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    /// The request URL has expired
    UrlExpiry,
    /// The server asked for a reload
    ReloadResponse,
}

/// Attestation token state visible to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    /// Token accepted
    Ok,
    /// No token needed for this stream
    NotRequired,
    /// A token is required and none was supplied
    Missing,
    /// The supplied token was rejected
    Invalid,
    /// The supplied token is being evaluated
    Pending,
    /// Evaluation is pending and no token was supplied
    PendingMissing,
}

impl TokenStatus {
    /// Whether the caller should hold new segment requests
    pub fn blocks_requests(&self) -> bool {
        matches!(self, TokenStatus::Missing | TokenStatus::Invalid)
    }
}

/// One protocol-level occurrence surfaced to the caller
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A selector was bound to a server-announced format
    FormatInitialized {
        /// Format id assigned by the server
        format_id: FormatId,
        /// Selector that claimed the format
        selector: Arc<FormatSelector>,
        /// Full mime type from the announcement
        mime_type: String,
        /// Total number of media segments, when known
        total_segments: Option<u64>,
        /// Total duration in milliseconds, when known
        duration_ms: Option<u64>,
    },

    /// The playback position moved without the caller asking
    MediaSeek {
        /// Format whose delivery position moved
        format_id: FormatId,
        /// Selector bound to the format
        selector: Arc<FormatSelector>,
        /// Why the position moved
        reason: SeekReason,
    },

    /// A segment opened and data parts will follow
    SegmentStarted {
        /// Format the segment belongs to
        format_id: FormatId,
        /// Selector bound to the format
        selector: Arc<FormatSelector>,
        /// Position within the format, absent for init segments
        sequence_number: Option<u64>,
        /// Whether the segment carries initialization data
        is_init_segment: bool,
        /// Presentation start time in milliseconds
        start_time_ms: Option<u64>,
        /// Playback duration in milliseconds
        duration_ms: Option<u64>,
        /// Whether the duration was estimated rather than declared
        duration_estimated: bool,
        /// Payload size in bytes
        content_length: Option<u64>,
        /// Whether the content length was estimated rather than declared
        content_length_estimated: bool,
        /// Byte offset of the segment within the format resource
        start_bytes: Option<u64>,
        /// Total number of media segments in the format, when known
        total_segments: Option<u64>,
    },

    /// Raw bytes arrived for an open segment
    SegmentData {
        /// Format the segment belongs to
        format_id: FormatId,
        /// Selector bound to the format
        selector: Arc<FormatSelector>,
        /// Position within the format, absent for init segments
        sequence_number: Option<u64>,
        /// Whether the segment carries initialization data
        is_init_segment: bool,
        /// Byte offset of the segment within the format resource
        start_bytes: Option<u64>,
        /// Total number of media segments in the format, when known
        total_segments: Option<u64>,
        /// The bytes, in arrival order
        data: Bytes,
    },

    /// An open segment closed
    SegmentEnded {
        /// Format the segment belongs to
        format_id: FormatId,
        /// Selector bound to the format
        selector: Arc<FormatSelector>,
        /// Position within the format, absent for init segments
        sequence_number: Option<u64>,
        /// Whether the segment carried initialization data
        is_init_segment: bool,
        /// Presentation start time in milliseconds
        start_time_ms: Option<u64>,
        /// Playback duration in milliseconds
        duration_ms: Option<u64>,
        /// Whether the duration was estimated rather than declared
        duration_estimated: bool,
        /// Byte offset of the segment within the format resource
        start_bytes: Option<u64>,
        /// Total number of media segments in the format, when known
        total_segments: Option<u64>,
    },

    /// The attestation token state changed
    TokenStatusChanged {
        /// New token state
        status: TokenStatus,
    },

    /// The caller must refresh its player response
    RefreshNeeded {
        /// Why the refresh is needed
        reason: RefreshReason,
        /// Opaque token to echo on the reload request, when provided
        reload_token: Option<Bytes>,
    },
}
