//! Error types for SABR stream decoding

use thiserror::Error;

/// Main error type for UMP decoding and SABR protocol interpretation
#[derive(Error, Debug)]
pub enum SabrError {
    /// Stream ended inside a multi-byte varint or a declared part payload
    #[error("Stream truncated mid-structure")]
    Truncated,

    /// Protocol violation that is not attributable to truncation
    #[error("Protocol error: {reason}")]
    Protocol {
        /// Reason for the protocol error
        reason: String,
    },

    /// Media segment arrived out of order for a format
    #[error("Segment mismatch for format {format_id}: expected sequence {expected}, received {received}")]
    SegmentMismatch {
        /// Format the segment belongs to
        format_id: u64,
        /// Sequence number the tracker expected next
        expected: u64,
        /// Sequence number carried by the media header
        received: u64,
    },

    /// Declared and received segment sizes disagree at segment end
    #[error("Content length mismatch for header {header_id}: expected {expected} bytes, received {received}")]
    ContentLengthMismatch {
        /// Header id of the offending segment
        header_id: u64,
        /// Content length declared by the media header
        expected: u64,
        /// Bytes actually received before the end marker
        received: u64,
    },

    /// Media data referenced a header id with no pending segment
    #[error("No pending segment for header id {header_id}")]
    UnknownHeaderId {
        /// Header id carried by the media part
        header_id: u64,
    },

    /// Media header reused a header id that is still pending
    #[error("Duplicate header id {header_id}")]
    DuplicateHeaderId {
        /// Header id carried by the media header
        header_id: u64,
    },

    /// The byte source requested cooperative cancellation
    #[error("Read interrupted")]
    Interrupted,
}
