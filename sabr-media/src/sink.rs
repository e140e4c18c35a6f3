//! Sample sink interface
//!
//! Extracted frames are pushed through [`SampleSink`] in arrival order:
//! first the bytes, then one metadata call describing them. The data
//! slice borrows the extractor's working buffer, so a sink that needs
//! the bytes past the call must copy them.

/// Per-sample flags delivered with sample metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleFlags {
    /// Whether the sample is a keyframe / sync sample
    pub keyframe: bool,
}

/// Consumer of extracted elementary frames
pub trait SampleSink {
    /// Receive the bytes of the next sample
    fn sample_data(&mut self, data: &[u8]);

    /// Describe the sample whose bytes were just delivered
    ///
    /// `size` covers the preceding `sample_data` call and `offset` is
    /// the byte distance from the end of the delivered data back to the
    /// start of the sample, mirroring the order bytes arrived in.
    fn sample_metadata(&mut self, time_us: i64, flags: SampleFlags, size: usize, offset: usize);
}

/// Sink that records every call, for tests and diagnostics
#[derive(Debug, Default)]
pub struct RecordingSink {
    /// Sample payloads in arrival order
    pub samples: Vec<Vec<u8>>,
    /// Metadata tuples in arrival order
    pub metadata: Vec<(i64, SampleFlags, usize, usize)>,
}

impl SampleSink for RecordingSink {
    fn sample_data(&mut self, data: &[u8]) {
        self.samples.push(data.to_vec());
    }

    fn sample_metadata(&mut self, time_us: i64, flags: SampleFlags, size: usize, offset: usize) {
        self.metadata.push((time_us, flags, size, offset));
    }
}
