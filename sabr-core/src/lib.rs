//! UMP wire decoding and SABR protocol interpretation
//!
//! This crate turns a raw SABR response stream into typed session
//! events. The pipeline is pull-based and synchronous: a
//! [`UmpDecoder`] frames varint-prefixed parts out of a
//! [`ByteSource`], and a [`SabrInterpreter`] validates each part
//! against per-format state before surfacing [`SessionEvent`]s.
//!
//! Transport, token acquisition, DRM, and presentation are all external
//! collaborators; nothing in this crate performs I/O beyond the byte
//! source handed to it.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod events;
pub mod interpreter;
pub mod io;
pub mod selector;
pub mod state;
pub mod ump;
pub mod varint;
pub mod wire;

// Re-export main types for convenience
pub use error::SabrError;
pub use events::{RefreshReason, SeekReason, SessionEvent, TokenStatus};
pub use interpreter::SabrInterpreter;
pub use io::{ByteSource, LimitedSource, ReadOutcome, SliceSource};
pub use selector::{FormatId, FormatSelector, MimePrefix, SelectorRegistry};
pub use state::{ConsumedRange, FormatState, Segment};
pub use ump::{UmpDecoder, UmpPart, UmpPartId};
pub use wire::{
    FormatInitMetadata, LiveMetadata, MediaData, MediaEnd, MediaHeader, NextRequestPolicy,
    ProtectionStatus, ReloadPlayerResponse, SabrContextSendingPolicy, SabrContextUpdate,
    SabrErrorPart, SabrRedirect, SabrSeek, StreamProtectionStatus,
};
