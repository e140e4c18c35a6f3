//! Per-format playback state
//!
//! One [`FormatState`] exists per server-announced format for the life of
//! the session. It tracks the segment currently being received, which
//! sequence ranges have already been delivered, and the init segment.

use crate::selector::{FormatId, FormatSelector};
use std::sync::Arc;

/// Sentinel end sequence marking a format fully consumed
pub const CONSUMED_TO_END: u64 = (1 << 53) - 1;

/// A segment announced by a media header and not yet closed
#[derive(Debug, Clone)]
pub struct Segment {
    /// Format the segment belongs to
    pub format_id: FormatId,
    /// Whether this segment carries initialization data
    pub is_init_segment: bool,
    /// Position within the format, absent for init segments
    pub sequence_number: Option<u64>,
    /// Presentation start time in milliseconds
    pub start_time_ms: Option<u64>,
    /// Playback duration in milliseconds
    pub duration_ms: Option<u64>,
    /// Whether the duration was estimated rather than declared
    pub duration_estimated: bool,
    /// Declared payload size in bytes
    pub content_length: Option<u64>,
    /// Whether the content length was estimated rather than declared
    pub content_length_estimated: bool,
    /// Byte offset of the segment within the format resource
    pub start_data_range_bytes: Option<u64>,
    /// Bytes received so far
    pub received_data_length: u64,
    /// Whether the segment's bytes are dropped before any sink
    pub discard: bool,
    /// Whether the segment was already delivered and is being skipped
    pub consumed: bool,
}

/// A contiguous run of sequence numbers already delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumedRange {
    /// First sequence number in the run
    pub start_sequence_number: u64,
    /// Last sequence number in the run, inclusive
    pub end_sequence_number: u64,
    /// Presentation start of the run in milliseconds
    pub start_time_ms: u64,
    /// Total duration of the run in milliseconds
    pub duration_ms: u64,
}

impl ConsumedRange {
    /// Whether the run covers `sequence_number`
    pub fn contains(&self, sequence_number: u64) -> bool {
        sequence_number >= self.start_sequence_number
            && sequence_number <= self.end_sequence_number
    }
}

/// Session-lifetime state for one format
#[derive(Debug)]
pub struct FormatState {
    /// Format id assigned by the server
    pub format_id: FormatId,
    /// Selector that claimed the format
    pub selector: Arc<FormatSelector>,
    /// Full mime type from the format announcement
    pub mime_type: String,
    /// Highest sequence number the format will ever carry, when known
    pub sequence_limit: Option<u64>,
    /// Total number of media segments, when known
    pub total_segments: Option<u64>,
    /// Whether matched media is decoded but dropped
    pub discard: bool,
    /// Delivered sequence runs, ordered and non-overlapping
    consumed_ranges: Vec<ConsumedRange>,
    /// Segment currently being received
    pub current_segment: Option<Segment>,
    /// Fully received init segment, when one has arrived
    pub init_segment: Option<Segment>,
    /// Sequence number of the last closed media segment
    pub last_sequence_number: Option<u64>,
    /// Whether the previous header for this format was a consumed skip
    pub in_consumed_run: bool,
}

impl FormatState {
    /// Create state for a freshly announced format
    pub fn new(format_id: FormatId, selector: Arc<FormatSelector>, mime_type: String) -> Self {
        let discard = selector.discard_media;
        let mut state = Self {
            format_id,
            selector,
            mime_type,
            sequence_limit: None,
            total_segments: None,
            discard,
            consumed_ranges: Vec::new(),
            current_segment: None,
            init_segment: None,
            last_sequence_number: None,
            in_consumed_run: false,
        };
        if discard {
            // A fully consumed range tells the server to stop sending.
            state.consumed_ranges.push(ConsumedRange {
                start_sequence_number: 0,
                end_sequence_number: CONSUMED_TO_END,
                start_time_ms: 0,
                duration_ms: 0,
            });
        }
        state
    }

    /// Delivered sequence runs, ordered and non-overlapping
    pub fn consumed_ranges(&self) -> &[ConsumedRange] {
        &self.consumed_ranges
    }

    /// Whether `sequence_number` falls inside a delivered run
    pub fn is_consumed(&self, sequence_number: u64) -> bool {
        self.consumed_ranges
            .iter()
            .any(|r| r.contains(sequence_number))
    }

    /// Record a closed media segment as delivered
    ///
    /// Extends the trailing range when the segment directly follows it,
    /// otherwise opens a new range.
    pub fn mark_consumed(&mut self, sequence_number: u64, start_time_ms: u64, duration_ms: u64) {
        if let Some(last) = self.consumed_ranges.last_mut() {
            if last.end_sequence_number + 1 == sequence_number {
                last.end_sequence_number = sequence_number;
                last.duration_ms += duration_ms;
                return;
            }
            if last.contains(sequence_number) {
                return;
            }
        }
        self.consumed_ranges.push(ConsumedRange {
            start_sequence_number: sequence_number,
            end_sequence_number: sequence_number,
            start_time_ms,
            duration_ms,
        });
    }

    /// Invalidate delivered runs from a server seek point forward
    ///
    /// Runs starting at or after `time_ms` are dropped; a run straddling
    /// the point keeps its sequence span but is clamped in duration.
    pub fn truncate_consumed_from(&mut self, time_ms: u64) {
        self.consumed_ranges.retain(|r| r.start_time_ms < time_ms);
        if let Some(last) = self.consumed_ranges.last_mut() {
            let end_time = last.start_time_ms + last.duration_ms;
            if end_time > time_ms {
                last.duration_ms = time_ms - last.start_time_ms;
            }
        }
    }
}
