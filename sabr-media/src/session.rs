//! Session engine
//!
//! [`SabrSession`] ties the pipeline together: a UMP decoder over the
//! caller's byte source, the protocol interpreter, one frame extractor
//! per selected format, and the caller's sample sink. Everything is
//! synchronous pull; one `poll` call decodes at most one part and
//! surfaces its events one at a time.

use crate::boundary::CodecFamily;
use crate::error::MediaError;
use crate::extractor::FrameExtractor;
use crate::sink::SampleSink;
use sabr_core::interpreter::SabrInterpreter;
use sabr_core::io::{ByteSource, SliceSource};
use sabr_core::selector::{FormatId, SelectorRegistry};
use sabr_core::ump::UmpDecoder;
use sabr_core::SessionEvent;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// One SABR playback session over one response stream
pub struct SabrSession<S, K> {
    decoder: UmpDecoder<S>,
    interpreter: SabrInterpreter,
    extractors: HashMap<FormatId, FrameExtractor>,
    sink: K,
    pending: VecDeque<SessionEvent>,
}

impl<S: ByteSource, K: SampleSink> SabrSession<S, K> {
    /// Create a session
    ///
    /// `po_token_present` selects the token status mapping reported on
    /// stream protection parts.
    pub fn new(source: S, selectors: SelectorRegistry, sink: K, po_token_present: bool) -> Self {
        Self {
            decoder: UmpDecoder::new(source),
            interpreter: SabrInterpreter::new(selectors, po_token_present),
            extractors: HashMap::new(),
            sink,
            pending: VecDeque::new(),
        }
    }

    /// Advance the session by at most one UMP part
    ///
    /// Media bytes are routed through the owning format's extractor into
    /// the sample sink before the event is surfaced. `Ok(None)` means
    /// the stream ended cleanly. An [`SabrError::Interrupted`] from the
    /// source propagates without losing committed state; the call may be
    /// repeated after the source resumes.
    ///
    /// [`SabrError::Interrupted`]: sabr_core::SabrError::Interrupted
    pub fn poll(&mut self) -> Result<Option<SessionEvent>, MediaError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            let part = match self.decoder.decode()? {
                Some(part) => part,
                None => return Ok(None),
            };
            for event in self.interpreter.handle(part)? {
                self.route(&event)?;
                self.pending.push_back(event);
            }
        }
    }

    /// Queue a refresh notice after the transport saw the URL expire
    pub fn note_url_expiry(&mut self) {
        let event = self.interpreter.note_url_expiry();
        self.pending.push_back(event);
    }

    /// Protocol state shared with the caller
    pub fn interpreter(&self) -> &SabrInterpreter {
        &self.interpreter
    }

    /// The sample sink
    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Tear the session down, returning the sink
    pub fn into_sink(self) -> K {
        self.sink
    }

    fn route(&mut self, event: &SessionEvent) -> Result<(), MediaError> {
        match event {
            SessionEvent::FormatInitialized {
                format_id,
                mime_type,
                ..
            } => {
                // Caption formats bypass extraction; their bytes reach
                // the caller through the segment events themselves.
                if mime_type[..4.min(mime_type.len())].eq_ignore_ascii_case("text") {
                    debug!(format_id = format_id.0, "No extractor for caption format");
                    return Ok(());
                }
                let family = CodecFamily::from_mime(mime_type)?;
                self.extractors
                    .insert(*format_id, FrameExtractor::for_family(family));
            }
            SessionEvent::SegmentStarted {
                format_id,
                is_init_segment: false,
                start_time_ms,
                ..
            } => {
                if let Some(extractor) = self.extractors.get_mut(format_id) {
                    let start_us = start_time_ms.unwrap_or(0) as i64 * 1000;
                    extractor.reset_for_new_segment(start_us);
                }
            }
            SessionEvent::SegmentData {
                format_id,
                is_init_segment: false,
                data,
                ..
            } => {
                if let Some(extractor) = self.extractors.get_mut(format_id) {
                    let mut chunk = SliceSource::new(data.clone());
                    extractor.read_from_input(&mut chunk, data.len(), &mut self.sink)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}
