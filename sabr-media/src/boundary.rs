//! Frame boundary detection strategies
//!
//! Each codec family contributes one [`FrameBoundary`] implementation
//! describing where a new elementary frame may begin. The scanner in
//! [`crate::extractor`] is codec-agnostic and drives whichever strategy
//! the format's mime type maps to.

use crate::error::MediaError;

/// Elementary stream families the extractor can segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecFamily {
    /// AAC in ADTS framing
    Aac,
    /// H.264 Annex-B
    Avc,
    /// VP9
    Vp9,
    /// Vorbis in Ogg pages
    Vorbis,
    /// Opus
    Opus,
}

impl CodecFamily {
    /// Derive the family from a full mime type, codec parameter included
    pub fn from_mime(mime_type: &str) -> Result<Self, MediaError> {
        let lower = mime_type.to_ascii_lowercase();
        if lower.contains("avc") {
            Ok(CodecFamily::Avc)
        } else if lower.contains("vp9") || lower.contains("vp09") {
            Ok(CodecFamily::Vp9)
        } else if lower.contains("opus") {
            Ok(CodecFamily::Opus)
        } else if lower.contains("vorbis") {
            Ok(CodecFamily::Vorbis)
        } else if lower.contains("mp4a") {
            Ok(CodecFamily::Aac)
        } else {
            Err(MediaError::UnsupportedCodec {
                mime_type: mime_type.to_string(),
            })
        }
    }

    /// Default frame duration used until real timing metadata is known
    pub fn default_frame_duration_us(&self) -> i64 {
        match self {
            // 1024 samples at 44.1 kHz
            CodecFamily::Aac => 23_219,
            CodecFamily::Avc | CodecFamily::Vp9 => 33_333,
            CodecFamily::Vorbis => 23_219,
            CodecFamily::Opus => 20_000,
        }
    }

    /// Boundary strategy for this family
    pub fn boundary(&self) -> Box<dyn FrameBoundary> {
        match self {
            CodecFamily::Aac => Box::new(AdtsBoundary),
            CodecFamily::Avc => Box::new(AvcBoundary),
            CodecFamily::Vp9 => Box::new(Vp9Boundary),
            CodecFamily::Vorbis => Box::new(VorbisBoundary),
            CodecFamily::Opus => Box::new(OpusBoundary),
        }
    }
}

/// Codec-specific knowledge of where frames begin
pub trait FrameBoundary: Send {
    /// Length of the boundary marker opening the frame at offset zero
    ///
    /// The scanner skips this many bytes before searching for the next
    /// frame start, so a frame never terminates on its own marker.
    fn start_code_len(&self, frame: &[u8]) -> usize;

    /// Offset of the next frame start at or after `from`, if visible
    fn next_frame_start(&self, data: &[u8], from: usize) -> Option<usize>;
}

/// ADTS sync word: twelve set bits spanning two bytes
#[derive(Debug, Clone, Copy)]
pub struct AdtsBoundary;

impl FrameBoundary for AdtsBoundary {
    fn start_code_len(&self, _frame: &[u8]) -> usize {
        2
    }

    fn next_frame_start(&self, data: &[u8], from: usize) -> Option<usize> {
        if data.len() < 2 {
            return None;
        }
        (from..data.len() - 1)
            .find(|&i| data[i] == 0xFF && data[i + 1] & 0xF0 == 0xF0)
    }
}

/// Annex-B start code, three bytes with an optional leading zero
#[derive(Debug, Clone, Copy)]
pub struct AvcBoundary;

impl FrameBoundary for AvcBoundary {
    fn start_code_len(&self, frame: &[u8]) -> usize {
        if frame.starts_with(&[0, 0, 0, 1]) {
            4
        } else if frame.starts_with(&[0, 0, 1]) {
            3
        } else {
            1
        }
    }

    fn next_frame_start(&self, data: &[u8], from: usize) -> Option<usize> {
        if data.len() < 3 {
            return None;
        }
        for i in from..data.len() - 2 {
            if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
                // Fold a preceding zero into the four-byte form.
                if i > from && data[i - 1] == 0 {
                    return Some(i - 1);
                }
                return Some(i);
            }
        }
        None
    }
}

/// VP9 frame marker heuristic on the top two bits
///
/// Approximate: superframe indexes and some profiles defeat it. Kept
/// until container-level framing is available.
#[derive(Debug, Clone, Copy)]
pub struct Vp9Boundary;

impl FrameBoundary for Vp9Boundary {
    fn start_code_len(&self, _frame: &[u8]) -> usize {
        1
    }

    fn next_frame_start(&self, data: &[u8], from: usize) -> Option<usize> {
        (from..data.len()).find(|&i| data[i] & 0xC0 == 0x80)
    }
}

/// Ogg page capture pattern
#[derive(Debug, Clone, Copy)]
pub struct VorbisBoundary;

const OGG_CAPTURE: &[u8; 4] = b"OggS";

impl FrameBoundary for VorbisBoundary {
    fn start_code_len(&self, frame: &[u8]) -> usize {
        if frame.starts_with(OGG_CAPTURE) {
            4
        } else {
            1
        }
    }

    fn next_frame_start(&self, data: &[u8], from: usize) -> Option<usize> {
        if data.len() < 4 {
            return None;
        }
        (from..data.len() - 3).find(|&i| &data[i..i + 4] == OGG_CAPTURE)
    }
}

/// Opus placeholder treating every byte as a candidate frame start
///
/// Known limitation: raw Opus packets carry no self-delimiting sync
/// pattern, so this degenerates to one-byte frames.
#[derive(Debug, Clone, Copy)]
pub struct OpusBoundary;

impl FrameBoundary for OpusBoundary {
    fn start_code_len(&self, _frame: &[u8]) -> usize {
        1
    }

    fn next_frame_start(&self, data: &[u8], from: usize) -> Option<usize> {
        if from < data.len() {
            Some(from)
        } else {
            None
        }
    }
}
