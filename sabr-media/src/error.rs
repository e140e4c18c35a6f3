//! Error types for media extraction

use sabr_core::SabrError;
use thiserror::Error;

/// Main error type for frame extraction and the session engine
#[derive(Error, Debug)]
pub enum MediaError {
    /// Error surfaced by the protocol layer or the byte source
    #[error(transparent)]
    Stream(#[from] SabrError),

    /// No extractor strategy exists for the announced mime type
    #[error("Unsupported codec: {mime_type}")]
    UnsupportedCodec {
        /// Mime type from the format announcement
        mime_type: String,
    },

    /// A container parser reported progress without consuming bytes
    #[error("Container parser stalled with {remaining} bytes remaining")]
    ContainerStalled {
        /// Bytes left in the chunk when the parser stalled
        remaining: u64,
    },
}
