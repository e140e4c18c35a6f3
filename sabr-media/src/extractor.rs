//! Codec-agnostic frame scanning
//!
//! One [`FrameExtractor`] serves every codec family; the codec-specific
//! part is the injected [`FrameBoundary`] strategy. The extractor keeps
//! a rolling buffer, emits each completed frame to the sink as a
//! borrowed slice, and shifts the unconsumed tail back to offset zero.

use crate::boundary::{CodecFamily, FrameBoundary};
use crate::error::MediaError;
use crate::sink::{SampleFlags, SampleSink};
use sabr_core::io::{ByteSource, ReadOutcome};

/// Sliding-window scanner splitting raw segment bytes into frames
pub struct FrameExtractor {
    boundary: Box<dyn FrameBoundary>,
    buffer: Vec<u8>,
    start_time_us: i64,
    frame_duration_us: i64,
    frame_index: i64,
    keyframe_pending: bool,
}

impl std::fmt::Debug for FrameExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameExtractor")
            .field("buffered", &self.buffer.len())
            .field("frame_index", &self.frame_index)
            .finish()
    }
}

impl FrameExtractor {
    /// Create an extractor with an explicit boundary strategy
    pub fn new(boundary: Box<dyn FrameBoundary>, frame_duration_us: i64) -> Self {
        Self {
            boundary,
            buffer: Vec::new(),
            start_time_us: 0,
            frame_duration_us,
            frame_index: 0,
            keyframe_pending: true,
        }
    }

    /// Create an extractor for a codec family with its default timing
    pub fn for_family(family: CodecFamily) -> Self {
        Self::new(family.boundary(), family.default_frame_duration_us())
    }

    /// Rebase timing for a new segment
    ///
    /// The first frame emitted after this call carries the keyframe
    /// flag.
    pub fn reset_for_new_segment(&mut self, start_time_us: i64) {
        self.buffer.clear();
        self.start_time_us = start_time_us;
        self.frame_index = 0;
        self.keyframe_pending = true;
    }

    /// Pull up to `max_len` bytes from `source` and emit frames
    ///
    /// Every byte read is emitted before the call returns: complete
    /// frames individually, and a tail with no visible next boundary as
    /// the final frame of this read. Returns the number of bytes
    /// consumed from the source.
    pub fn read_from_input<S, K>(
        &mut self,
        source: &mut S,
        max_len: usize,
        sink: &mut K,
    ) -> Result<usize, MediaError>
    where
        S: ByteSource + ?Sized,
        K: SampleSink + ?Sized,
    {
        let base = self.buffer.len();
        self.buffer.resize(base + max_len, 0);
        let mut appended = 0;
        while appended < max_len {
            match source.read(&mut self.buffer[base + appended..])? {
                ReadOutcome::Bytes(n) => appended += n,
                ReadOutcome::EndOfInput => break,
            }
        }
        self.buffer.truncate(base + appended);

        self.drain_frames(sink);
        Ok(appended)
    }

    fn drain_frames<K: SampleSink + ?Sized>(&mut self, sink: &mut K) {
        while !self.buffer.is_empty() {
            let skip = self
                .boundary
                .start_code_len(&self.buffer)
                .max(1)
                .min(self.buffer.len());
            match self.boundary.next_frame_start(&self.buffer, skip) {
                Some(next) => {
                    self.emit(next, sink);
                    self.buffer.drain(..next);
                }
                None => {
                    // No boundary in sight: the rest is the final frame
                    // of this read.
                    let len = self.buffer.len();
                    self.emit(len, sink);
                    self.buffer.clear();
                }
            }
        }
    }

    fn emit<K: SampleSink + ?Sized>(&mut self, len: usize, sink: &mut K) {
        let flags = SampleFlags {
            keyframe: self.keyframe_pending,
        };
        self.keyframe_pending = false;
        let time_us = self.start_time_us + self.frame_index * self.frame_duration_us;
        self.frame_index += 1;
        sink.sample_data(&self.buffer[..len]);
        sink.sample_metadata(time_us, flags, len, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::RecordingSink;
    use sabr_core::io::SliceSource;

    fn extract(family: CodecFamily, data: &[u8]) -> RecordingSink {
        let mut extractor = FrameExtractor::for_family(family);
        extractor.reset_for_new_segment(0);
        let mut sink = RecordingSink::default();
        let mut source = SliceSource::new(data.to_vec());
        extractor
            .read_from_input(&mut source, data.len(), &mut sink)
            .unwrap();
        sink
    }

    #[test]
    fn test_avc_two_nal_units() {
        let data = [
            0x00, 0x00, 0x00, 0x01, 0x67, 0xAA, // SPS
            0x00, 0x00, 0x01, 0x65, 0xBB, 0xCC, // IDR slice
        ];
        let sink = extract(CodecFamily::Avc, &data);

        assert_eq!(sink.samples.len(), 2);
        assert_eq!(sink.samples[0], &data[..6]);
        assert_eq!(sink.samples[1], &data[6..]);
        // Only the first frame after a reset is a keyframe.
        assert!(sink.metadata[0].1.keyframe);
        assert!(!sink.metadata[1].1.keyframe);
    }

    #[test]
    fn test_adts_two_frame_split() {
        let data = [
            0xFF, 0xF1, 0x50, 0x80, 0x01, 0x02, // frame 1
            0xFF, 0xF1, 0x50, 0x80, 0x03, 0x04, // frame 2
        ];
        let sink = extract(CodecFamily::Aac, &data);

        assert_eq!(sink.samples.len(), 2);
        assert_eq!(sink.samples[0], &data[..6]);
        assert_eq!(sink.samples[1], &data[6..]);
    }

    #[test]
    fn test_frame_times_advance_by_duration() {
        let mut extractor = FrameExtractor::new(Box::new(crate::boundary::AdtsBoundary), 1000);
        extractor.reset_for_new_segment(5_000_000);
        let mut sink = RecordingSink::default();
        let data = [0xFFu8, 0xF1, 0x00, 0xFF, 0xF1, 0x00, 0xFF, 0xF1, 0x00];
        let mut source = SliceSource::new(data.to_vec());
        extractor
            .read_from_input(&mut source, data.len(), &mut sink)
            .unwrap();

        let times: Vec<i64> = sink.metadata.iter().map(|m| m.0).collect();
        assert_eq!(times, vec![5_000_000, 5_001_000, 5_002_000]);
    }

    #[test]
    fn test_tail_without_boundary_is_last_frame() {
        // One complete ADTS frame, then bytes with no further sync word.
        let data = [0xFF, 0xF1, 0x11, 0xFF, 0xF1, 0x22, 0x33];
        let sink = extract(CodecFamily::Aac, &data);
        assert_eq!(sink.samples.len(), 2);
        assert_eq!(sink.samples[1], &data[3..]);
    }

    #[test]
    fn test_reset_restores_keyframe_and_timing() {
        let mut extractor = FrameExtractor::for_family(CodecFamily::Vp9);
        let mut sink = RecordingSink::default();

        extractor.reset_for_new_segment(0);
        let data = [0x80u8, 0x01, 0x80, 0x02];
        let mut source = SliceSource::new(data.to_vec());
        extractor
            .read_from_input(&mut source, data.len(), &mut sink)
            .unwrap();

        extractor.reset_for_new_segment(1_000_000);
        let mut source = SliceSource::new(data.to_vec());
        extractor
            .read_from_input(&mut source, data.len(), &mut sink)
            .unwrap();

        assert_eq!(sink.samples.len(), 4);
        assert!(sink.metadata[0].1.keyframe);
        assert!(!sink.metadata[1].1.keyframe);
        assert!(sink.metadata[2].1.keyframe);
        assert_eq!(sink.metadata[2].0, 1_000_000);
    }

    #[test]
    fn test_opus_placeholder_emits_single_byte_frames() {
        let sink = extract(CodecFamily::Opus, &[0x10, 0x20, 0x30]);
        assert_eq!(sink.samples.len(), 3);
        assert!(sink.samples.iter().all(|s| s.len() == 1));
    }

    #[test]
    fn test_partial_read_respects_max_len() {
        let mut extractor = FrameExtractor::for_family(CodecFamily::Opus);
        extractor.reset_for_new_segment(0);
        let mut sink = RecordingSink::default();
        let mut source = SliceSource::new(vec![1u8, 2, 3, 4]);
        let consumed = extractor
            .read_from_input(&mut source, 2, &mut sink)
            .unwrap();
        assert_eq!(consumed, 2);
        assert_eq!(source.remaining(), 2);
    }
}
