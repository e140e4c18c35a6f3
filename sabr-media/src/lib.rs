//! Elementary-frame extraction and session engine for SABR streams
//!
//! Builds on `sabr-core`: the [`SabrSession`] engine decodes a SABR
//! response stream, routes media segment bytes through per-format
//! [`FrameExtractor`]s, and delivers elementary frames to a
//! [`SampleSink`]. Container-boxed formats can be driven through an
//! external parser via [`adapter::ContainerAdapter`].

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod adapter;
pub mod boundary;
pub mod error;
pub mod extractor;
pub mod session;
pub mod sink;

// Re-export main types for convenience
pub use adapter::{ContainerAdapter, ContainerParser, ParseOutcome};
pub use boundary::{CodecFamily, FrameBoundary};
pub use error::MediaError;
pub use extractor::FrameExtractor;
pub use session::SabrSession;
pub use sink::{RecordingSink, SampleFlags, SampleSink};
