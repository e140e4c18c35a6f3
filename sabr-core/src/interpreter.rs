//! SABR protocol interpretation
//!
//! [`SabrInterpreter`] consumes decoded UMP parts, validates them against
//! per-format state, and surfaces typed [`SessionEvent`]s. It owns all
//! mutable protocol state for a session; one interpreter per stream, no
//! shared or static state.

use crate::error::SabrError;
use crate::events::{RefreshReason, SeekReason, SessionEvent, TokenStatus};
use crate::selector::{FormatId, SelectorRegistry};
use crate::state::{FormatState, Segment};
use crate::ump::{UmpPart, UmpPartId};
use crate::wire::{
    ContextWritePolicy, FormatInitMetadata, LiveMetadata, MediaData, MediaEnd, MediaHeader,
    NextRequestPolicy, ProtectionStatus, ReloadPlayerResponse, SabrContextSendingPolicy,
    SabrContextUpdate, SabrErrorPart, SabrRedirect, SabrSeek, StreamProtectionStatus,
};
use bytes::Bytes;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// Slack subtracted from the target segment duration when estimating
/// live segment durations, in milliseconds
const LIVE_DURATION_TOLERANCE_MS: u64 = 100;

/// Stateful translator from UMP parts to session events
#[derive(Debug)]
pub struct SabrInterpreter {
    selectors: SelectorRegistry,
    formats: HashMap<FormatId, FormatState>,
    partial_segments: HashMap<u64, Segment>,
    token_status: Option<TokenStatus>,
    po_token_present: bool,
    player_time_ms: u64,
    is_live: bool,
    target_segment_duration_ms: Option<u64>,
    live_head_sequence: Option<u64>,
    redirect_url: Option<String>,
    next_request_policy: Option<NextRequestPolicy>,
    contexts: HashMap<u32, Bytes>,
    contexts_to_send: BTreeSet<u32>,
}

impl SabrInterpreter {
    /// Create an interpreter for one stream
    ///
    /// `po_token_present` selects which side of the token status mapping
    /// protection reports land on.
    pub fn new(selectors: SelectorRegistry, po_token_present: bool) -> Self {
        Self {
            selectors,
            formats: HashMap::new(),
            partial_segments: HashMap::new(),
            token_status: None,
            po_token_present,
            player_time_ms: 0,
            is_live: false,
            target_segment_duration_ms: None,
            live_head_sequence: None,
            redirect_url: None,
            next_request_policy: None,
            contexts: HashMap::new(),
            contexts_to_send: BTreeSet::new(),
        }
    }

    /// Interpret one decoded part
    ///
    /// Unknown part types are consumed and discarded. A part may produce
    /// zero, one, or several events.
    pub fn handle(&mut self, part: UmpPart) -> Result<Vec<SessionEvent>, SabrError> {
        match part.part_id {
            UmpPartId::MediaHeader => self.process_media_header(&part.data),
            UmpPartId::Media => self.process_media(&part.data),
            UmpPartId::MediaEnd => self.process_media_end(&part.data),
            UmpPartId::FormatInitializationMetadata => self.process_format_init(&part.data),
            UmpPartId::StreamProtectionStatus => self.process_protection_status(&part.data),
            UmpPartId::SabrSeek => self.process_sabr_seek(&part.data),
            UmpPartId::LiveMetadata => self.process_live_metadata(&part.data),
            UmpPartId::NextRequestPolicy => self.process_next_request_policy(&part.data),
            UmpPartId::SabrRedirect => self.process_redirect(&part.data),
            UmpPartId::SabrError => self.process_server_error(&part.data),
            UmpPartId::SabrContextUpdate => self.process_context_update(&part.data),
            UmpPartId::SabrContextSendingPolicy => self.process_sending_policy(&part.data),
            UmpPartId::ReloadPlayerResponse => self.process_reload(&part.data),
            UmpPartId::Unknown(id) => {
                debug!(part_id = id, "Unknown part encountered, skipping");
                Ok(Vec::new())
            }
        }
    }

    /// Signal that the transport saw the request URL expire
    pub fn note_url_expiry(&self) -> SessionEvent {
        SessionEvent::RefreshNeeded {
            reason: RefreshReason::UrlExpiry,
            reload_token: None,
        }
    }

    /// Current playback position in milliseconds
    pub fn player_time_ms(&self) -> u64 {
        self.player_time_ms
    }

    /// Whether the stream reported itself live
    pub fn is_live(&self) -> bool {
        self.is_live
    }

    /// Sequence number at the live head, when reported
    pub fn live_head_sequence(&self) -> Option<u64> {
        self.live_head_sequence
    }

    /// Latest redirect URL announced by the server
    pub fn redirect_url(&self) -> Option<&str> {
        self.redirect_url.as_deref()
    }

    /// Latest request policy announced by the server
    pub fn next_request_policy(&self) -> Option<&NextRequestPolicy> {
        self.next_request_policy.as_ref()
    }

    /// Latest attestation token status
    pub fn token_status(&self) -> Option<TokenStatus> {
        self.token_status
    }

    /// State for one announced format
    pub fn format(&self, format_id: FormatId) -> Option<&FormatState> {
        self.formats.get(&format_id)
    }

    /// All announced formats
    pub fn formats(&self) -> impl Iterator<Item = &FormatState> {
        self.formats.values()
    }

    /// Context blobs to echo on the next request, ordered by type
    pub fn contexts_to_send(&self) -> impl Iterator<Item = (u32, &Bytes)> {
        self.contexts_to_send
            .iter()
            .filter_map(|ty| self.contexts.get(ty).map(|value| (*ty, value)))
    }

    fn process_media_header(&mut self, data: &Bytes) -> Result<Vec<SessionEvent>, SabrError> {
        let header = MediaHeader::decode(data)?;
        let header_id = u64::from(header.header_id);
        if self.partial_segments.contains_key(&header_id) {
            return Err(SabrError::DuplicateHeaderId { header_id });
        }
        if header.compressed {
            return Err(SabrError::Protocol {
                reason: "Compressed media segments are not supported".to_string(),
            });
        }

        let format_id = FormatId(u64::from(header.format_id));
        let is_live = self.is_live;
        let target_duration_ms = self.target_segment_duration_ms;
        let format = self
            .formats
            .get_mut(&format_id)
            .ok_or_else(|| SabrError::Protocol {
                reason: format!("Media header for uninitialized format {}", format_id),
            })?;

        if let Some(limit) = header.sequence_limit {
            format.sequence_limit = Some(u64::from(limit));
        }

        let sequence_number = header.sequence_number.map(u64::from);
        if !header.is_init_segment && sequence_number.is_none() {
            return Err(SabrError::Protocol {
                reason: "Media segment header without a sequence number".to_string(),
            });
        }
        if let (Some(seq), Some(limit)) = (sequence_number, format.sequence_limit) {
            if seq > limit {
                return Err(SabrError::Protocol {
                    reason: format!("Sequence number {} exceeds limit {}", seq, limit),
                });
            }
        }

        let mut duration_ms = header.duration_ms.map(u64::from);
        let mut duration_estimated = false;
        if !header.is_init_segment && duration_ms.is_none() {
            match target_duration_ms {
                Some(target) if is_live => {
                    duration_ms = Some(target.saturating_sub(LIVE_DURATION_TOLERANCE_MS));
                    duration_estimated = true;
                }
                _ => {
                    return Err(SabrError::Protocol {
                        reason: "Cannot determine media segment duration".to_string(),
                    });
                }
            }
        }

        let mut content_length = header.content_length.map(u64::from);
        let mut content_length_estimated = false;
        if content_length.is_none() {
            if let (Some(bitrate), Some(duration)) = (header.bitrate_bps, duration_ms) {
                content_length = Some(u64::from(bitrate) * duration / 8000);
                content_length_estimated = true;
            }
        }

        // Segments the session already delivered are skipped, not re-emitted.
        let consumed = if header.is_init_segment {
            format.init_segment.is_some()
        } else {
            sequence_number.is_some_and(|seq| format.is_consumed(seq))
        };

        let mut events = Vec::new();
        if consumed {
            if !format.in_consumed_run && !format.discard {
                events.push(SessionEvent::MediaSeek {
                    format_id,
                    selector: format.selector.clone(),
                    reason: SeekReason::ConsumedSeek,
                });
            }
            format.in_consumed_run = true;
        } else {
            format.in_consumed_run = false;
        }

        if !consumed && !format.discard && !header.is_init_segment {
            if let (Some(last), Some(seq)) = (format.last_sequence_number, sequence_number) {
                let expected = last + 1;
                if seq != expected {
                    if is_live && seq.abs_diff(expected) <= 2 {
                        // Live edges drift by a segment around request
                        // boundaries; nudge the clock and skip instead of
                        // failing the stream.
                        debug!(
                            format_id = format_id.0,
                            expected, received = seq, "Live sequence drift, resyncing"
                        );
                        if seq < expected {
                            self.player_time_ms = self
                                .player_time_ms
                                .saturating_add(LIVE_DURATION_TOLERANCE_MS);
                        } else {
                            self.player_time_ms = self
                                .player_time_ms
                                .saturating_sub(LIVE_DURATION_TOLERANCE_MS);
                        }
                        format.in_consumed_run = true;
                        let segment = Segment {
                            format_id,
                            is_init_segment: header.is_init_segment,
                            sequence_number,
                            start_time_ms: header.start_time_ms.map(u64::from),
                            duration_ms,
                            duration_estimated,
                            content_length,
                            content_length_estimated,
                            start_data_range_bytes: header.start_data_range.map(u64::from),
                            received_data_length: 0,
                            discard: format.discard,
                            consumed: true,
                        };
                        format.current_segment = Some(segment.clone());
                        self.partial_segments.insert(header_id, segment);
                        return Ok(events);
                    }
                    return Err(SabrError::SegmentMismatch {
                        format_id: format_id.0,
                        expected,
                        received: seq,
                    });
                }
            }
        }

        let segment = Segment {
            format_id,
            is_init_segment: header.is_init_segment,
            sequence_number,
            start_time_ms: header.start_time_ms.map(u64::from),
            duration_ms,
            duration_estimated,
            content_length,
            content_length_estimated,
            start_data_range_bytes: header.start_data_range.map(u64::from),
            received_data_length: 0,
            discard: format.discard,
            consumed,
        };

        if !segment.discard && !segment.consumed {
            events.push(SessionEvent::SegmentStarted {
                format_id,
                selector: format.selector.clone(),
                sequence_number,
                is_init_segment: segment.is_init_segment,
                start_time_ms: segment.start_time_ms,
                duration_ms: segment.duration_ms,
                duration_estimated: segment.duration_estimated,
                content_length: segment.content_length,
                content_length_estimated: segment.content_length_estimated,
                start_bytes: segment.start_data_range_bytes,
                total_segments: format.total_segments,
            });
        }

        format.current_segment = Some(segment.clone());
        self.partial_segments.insert(header_id, segment);
        Ok(events)
    }

    fn process_media(&mut self, data: &Bytes) -> Result<Vec<SessionEvent>, SabrError> {
        let chunk = MediaData::decode(data)?;
        let header_id = u64::from(chunk.header_id);
        let segment =
            self.partial_segments
                .get_mut(&header_id)
                .ok_or(SabrError::UnknownHeaderId { header_id })?;

        segment.received_data_length += chunk.data.len() as u64;
        if segment.discard || segment.consumed {
            return Ok(Vec::new());
        }

        let format_id = segment.format_id;
        let format = self
            .formats
            .get(&format_id)
            .ok_or_else(|| SabrError::Protocol {
                reason: format!("Media data for uninitialized format {}", format_id),
            })?;

        Ok(vec![SessionEvent::SegmentData {
            format_id: segment.format_id,
            selector: format.selector.clone(),
            sequence_number: segment.sequence_number,
            is_init_segment: segment.is_init_segment,
            start_bytes: segment.start_data_range_bytes,
            total_segments: format.total_segments,
            data: chunk.data,
        }])
    }

    fn process_media_end(&mut self, data: &Bytes) -> Result<Vec<SessionEvent>, SabrError> {
        let end = MediaEnd::decode(data)?;
        let header_id = u64::from(end.header_id);
        let segment = match self.partial_segments.remove(&header_id) {
            Some(segment) => segment,
            None => {
                debug!(header_id, "Media end for unknown header id, skipping");
                return Ok(Vec::new());
            }
        };

        if let Some(expected) = segment.content_length {
            if segment.received_data_length != expected {
                if segment.content_length_estimated {
                    warn!(
                        header_id,
                        expected,
                        received = segment.received_data_length,
                        "Estimated content length missed"
                    );
                } else {
                    return Err(SabrError::ContentLengthMismatch {
                        header_id,
                        expected,
                        received: segment.received_data_length,
                    });
                }
            }
        }

        let format = self
            .formats
            .get_mut(&segment.format_id)
            .ok_or_else(|| SabrError::Protocol {
                reason: format!("Media end for uninitialized format {}", segment.format_id),
            })?;
        format.current_segment = None;

        if segment.is_init_segment {
            // Init segments are positionless; no consumed range is recorded.
            format.init_segment = Some(segment.clone());
        } else if let Some(seq) = segment.sequence_number {
            if !segment.consumed {
                let start_time = segment.start_time_ms.unwrap_or(self.player_time_ms);
                let duration = segment.duration_ms.unwrap_or(0);
                format.mark_consumed(seq, start_time, duration);
                format.last_sequence_number = Some(seq);
                let end_time = start_time + duration;
                if end_time > self.player_time_ms {
                    self.player_time_ms = end_time;
                }
            }
        }

        if segment.discard || segment.consumed {
            return Ok(Vec::new());
        }
        Ok(vec![SessionEvent::SegmentEnded {
            format_id: segment.format_id,
            selector: format.selector.clone(),
            sequence_number: segment.sequence_number,
            is_init_segment: segment.is_init_segment,
            start_time_ms: segment.start_time_ms,
            duration_ms: segment.duration_ms,
            duration_estimated: segment.duration_estimated,
            start_bytes: segment.start_data_range_bytes,
            total_segments: format.total_segments,
        }])
    }

    fn process_format_init(&mut self, data: &Bytes) -> Result<Vec<SessionEvent>, SabrError> {
        let meta = FormatInitMetadata::decode(data)?;
        let format_id = FormatId(u64::from(meta.format_id));
        if self.formats.contains_key(&format_id) {
            debug!(format_id = format_id.0, "Format already initialized, skipping");
            return Ok(Vec::new());
        }

        let selector = self
            .selectors
            .select(format_id, &meta.mime_type)
            .ok_or_else(|| SabrError::Protocol {
                reason: format!(
                    "No selector for format {} ({})",
                    format_id, meta.mime_type
                ),
            })?;

        let already_bound = self
            .formats
            .values()
            .any(|f| std::sync::Arc::ptr_eq(&f.selector, &selector));
        if already_bound {
            return Err(SabrError::Protocol {
                reason: format!(
                    "Selector {} already bound; server-side format changes are not supported",
                    selector.display_name
                ),
            });
        }

        let mut state = FormatState::new(format_id, selector.clone(), meta.mime_type.clone());
        state.total_segments = meta.total_segments.map(u64::from);
        let discard = state.discard;
        self.formats.insert(format_id, state);

        if discard {
            return Ok(Vec::new());
        }
        Ok(vec![SessionEvent::FormatInitialized {
            format_id,
            selector,
            mime_type: meta.mime_type,
            total_segments: meta.total_segments.map(u64::from),
            duration_ms: meta.duration_ms.map(u64::from),
        }])
    }

    fn process_protection_status(&mut self, data: &Bytes) -> Result<Vec<SessionEvent>, SabrError> {
        let report = StreamProtectionStatus::decode(data)?;
        let status = match (report.status, self.po_token_present) {
            (ProtectionStatus::Ok, true) => TokenStatus::Ok,
            (ProtectionStatus::Ok, false) => TokenStatus::NotRequired,
            (ProtectionStatus::AttestationPending, true) => TokenStatus::Pending,
            (ProtectionStatus::AttestationPending, false) => TokenStatus::PendingMissing,
            (ProtectionStatus::AttestationRequired, true) => TokenStatus::Invalid,
            (ProtectionStatus::AttestationRequired, false) => TokenStatus::Missing,
        };
        debug!(?status, "Stream protection status");
        self.token_status = Some(status);
        Ok(vec![SessionEvent::TokenStatusChanged { status }])
    }

    fn process_sabr_seek(&mut self, data: &Bytes) -> Result<Vec<SessionEvent>, SabrError> {
        let seek = SabrSeek::decode(data)?;
        Ok(self.apply_server_seek(seek.seek_time_ms()))
    }

    fn apply_server_seek(&mut self, time_ms: u64) -> Vec<SessionEvent> {
        debug!(time_ms, "Server seek");
        self.player_time_ms = time_ms;
        self.partial_segments.clear();
        let mut events = Vec::new();
        for format in self.formats.values_mut() {
            format.current_segment = None;
            format.in_consumed_run = false;
            format.truncate_consumed_from(time_ms);
            if !format.discard {
                events.push(SessionEvent::MediaSeek {
                    format_id: format.format_id,
                    selector: format.selector.clone(),
                    reason: SeekReason::ServerSeek,
                });
            }
        }
        events
    }

    fn process_live_metadata(&mut self, data: &Bytes) -> Result<Vec<SessionEvent>, SabrError> {
        let meta = LiveMetadata::decode(data)?;
        self.is_live = true;
        if let Some(target_sec) = meta.target_segment_duration_sec {
            self.target_segment_duration_ms = Some(u64::from(target_sec) * 1000);
        }
        if let Some(head) = meta.head_sequence_number {
            let head = u64::from(head);
            self.live_head_sequence = Some(head);
            for format in self.formats.values_mut() {
                if format.total_segments.map_or(true, |t| t < head) {
                    format.total_segments = Some(head);
                }
            }
        }
        if let Some(min_ms) = meta.min_seekable_time_ms() {
            // Falling out of the DVR window behaves like a server seek to
            // its earliest edge.
            if self.player_time_ms < min_ms {
                return Ok(self.apply_server_seek(min_ms));
            }
        }
        Ok(Vec::new())
    }

    fn process_next_request_policy(&mut self, data: &Bytes) -> Result<Vec<SessionEvent>, SabrError> {
        self.next_request_policy = Some(NextRequestPolicy::decode(data)?);
        Ok(Vec::new())
    }

    fn process_redirect(&mut self, data: &Bytes) -> Result<Vec<SessionEvent>, SabrError> {
        let redirect = SabrRedirect::decode(data)?;
        debug!(url = %redirect.redirect_url, "Server redirect");
        self.redirect_url = Some(redirect.redirect_url);
        Ok(Vec::new())
    }

    fn process_server_error(&mut self, data: &Bytes) -> Result<Vec<SessionEvent>, SabrError> {
        let error = SabrErrorPart::decode(data)?;
        let reason = match error.code {
            Some(code) => format!("Server error {} (code {})", error.error_type, code),
            None => format!("Server error {}", error.error_type),
        };
        Err(SabrError::Protocol { reason })
    }

    fn process_context_update(&mut self, data: &Bytes) -> Result<Vec<SessionEvent>, SabrError> {
        let update = SabrContextUpdate::decode(data)?;
        let exists = self.contexts.contains_key(&update.context_type);
        if exists && update.write_policy == ContextWritePolicy::KeepExisting {
            debug!(context_type = update.context_type, "Keeping existing context");
        } else {
            self.contexts.insert(update.context_type, update.value);
        }
        if update.send_by_default {
            self.contexts_to_send.insert(update.context_type);
        }
        Ok(Vec::new())
    }

    fn process_sending_policy(&mut self, data: &Bytes) -> Result<Vec<SessionEvent>, SabrError> {
        let policy = SabrContextSendingPolicy::decode(data)?;
        for ty in policy.start {
            self.contexts_to_send.insert(ty);
        }
        for ty in policy.stop {
            self.contexts_to_send.remove(&ty);
        }
        for ty in policy.discard {
            self.contexts_to_send.remove(&ty);
            self.contexts.remove(&ty);
        }
        Ok(Vec::new())
    }

    fn process_reload(&mut self, data: &Bytes) -> Result<Vec<SessionEvent>, SabrError> {
        let reload = ReloadPlayerResponse::decode(data)?;
        Ok(vec![SessionEvent::RefreshNeeded {
            reason: RefreshReason::ReloadResponse,
            reload_token: reload.reload_token,
        }])
    }
}
