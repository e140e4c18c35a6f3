//! End-to-end session runs over fabricated SABR streams

use bytes::{Bytes, BytesMut};
use sabr_core::io::{ByteSource, ReadOutcome, SliceSource};
use sabr_core::selector::{FormatSelector, SelectorRegistry};
use sabr_core::ump::UmpPartId;
use sabr_core::varint::encode_varint;
use sabr_core::wire::{FormatInitMetadata, MediaData, MediaEnd, MediaHeader};
use sabr_core::{SabrError, SessionEvent};
use sabr_media::{MediaError, RecordingSink, SabrSession};

fn part(part_id: UmpPartId, payload: &[u8], buf: &mut BytesMut) {
    encode_varint(part_id.as_u32(), buf);
    encode_varint(payload.len() as u32, buf);
    buf.extend_from_slice(payload);
}

fn avc_segment_stream(media: &[u8]) -> Bytes {
    let mut stream = BytesMut::new();

    let mut payload = BytesMut::new();
    FormatInitMetadata {
        format_id: 137,
        mime_type: "video/mp4; codecs=\"avc1.640028\"".to_string(),
        end_time_ms: None,
        total_segments: Some(1),
        duration_ms: Some(5000),
    }
    .encode(&mut payload);
    part(UmpPartId::FormatInitializationMetadata, &payload, &mut stream);

    let mut payload = BytesMut::new();
    MediaHeader {
        header_id: 1,
        format_id: 137,
        is_init_segment: false,
        compressed: false,
        sequence_number: Some(0),
        duration_ms: Some(5000),
        start_time_ms: Some(0),
        content_length: Some(media.len() as u32),
        start_data_range: None,
        sequence_limit: None,
        bitrate_bps: None,
    }
    .encode(&mut payload);
    part(UmpPartId::MediaHeader, &payload, &mut stream);

    let mut payload = BytesMut::new();
    MediaData {
        header_id: 1,
        data: Bytes::copy_from_slice(media),
    }
    .encode(&mut payload);
    part(UmpPartId::Media, &payload, &mut stream);

    let mut payload = BytesMut::new();
    MediaEnd { header_id: 1 }.encode(&mut payload);
    part(UmpPartId::MediaEnd, &payload, &mut stream);

    stream.freeze()
}

fn video_registry() -> SelectorRegistry {
    let mut registry = SelectorRegistry::new();
    registry.register(FormatSelector::video());
    registry
}

/// Route session logs through the test harness when RUST_LOG asks
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn test_session_extracts_frames_from_avc_segment() {
    init_logging();
    let media = [
        0x00, 0x00, 0x00, 0x01, 0x67, 0xAA, 0xBB, // SPS
        0x00, 0x00, 0x01, 0x65, 0x11, 0x22, 0x33, // IDR slice
    ];
    let source = SliceSource::new(avc_segment_stream(&media));
    let mut session = SabrSession::new(source, video_registry(), RecordingSink::default(), false);

    let mut events = Vec::new();
    while let Some(event) = session.poll().unwrap() {
        events.push(event);
    }

    assert!(matches!(events[0], SessionEvent::FormatInitialized { .. }));
    assert!(matches!(events[1], SessionEvent::SegmentStarted { .. }));
    assert!(matches!(events[2], SessionEvent::SegmentData { .. }));
    assert!(matches!(events[3], SessionEvent::SegmentEnded { .. }));

    let sink = session.into_sink();
    assert_eq!(sink.samples.len(), 2);
    assert_eq!(sink.samples[0], &media[..7]);
    assert_eq!(sink.samples[1], &media[7..]);
    assert!(sink.metadata[0].1.keyframe);
    assert!(!sink.metadata[1].1.keyframe);
    assert_eq!(sink.metadata[0].0, 0);
}

#[test]
fn test_unselected_format_fails_initialization() {
    init_logging();
    let source = SliceSource::new(avc_segment_stream(&[0u8; 4]));
    let mut registry = SelectorRegistry::new();
    registry.register(FormatSelector::audio());
    let mut session = SabrSession::new(source, registry, RecordingSink::default(), false);

    let err = session.poll().unwrap_err();
    assert!(matches!(
        err,
        MediaError::Stream(SabrError::Protocol { .. })
    ));
}

/// Source that interrupts once at a fixed byte position
struct InterruptingSource {
    inner: SliceSource,
    interrupt_after: usize,
    delivered: usize,
    fired: bool,
}

impl ByteSource for InterruptingSource {
    fn read(&mut self, dst: &mut [u8]) -> Result<ReadOutcome, SabrError> {
        if !self.fired {
            if self.delivered >= self.interrupt_after {
                self.fired = true;
                return Err(SabrError::Interrupted);
            }
            let cap = (self.interrupt_after - self.delivered).min(dst.len());
            let outcome = self.inner.read(&mut dst[..cap])?;
            if let ReadOutcome::Bytes(n) = outcome {
                self.delivered += n;
            }
            return Ok(outcome);
        }
        self.inner.read(dst)
    }
}

#[test]
fn test_interrupt_between_parts_is_resumable() {
    init_logging();
    let media = [0x00, 0x00, 0x00, 0x01, 0x65, 0x01];
    let stream = avc_segment_stream(&media);

    // Find the boundary after the format init part: type + size + payload.
    let first_part_len = {
        let mut decoder = sabr_core::ump::UmpDecoder::new(SliceSource::new(stream.clone()));
        decoder.decode().unwrap().unwrap();
        stream.len() - decoder.into_source().remaining()
    };

    let source = InterruptingSource {
        inner: SliceSource::new(stream),
        interrupt_after: first_part_len,
        delivered: 0,
        fired: false,
    };
    let mut session = SabrSession::new(source, video_registry(), RecordingSink::default(), false);

    // First poll surfaces the format event that was fully decoded.
    let first = session.poll().unwrap().unwrap();
    assert!(matches!(first, SessionEvent::FormatInitialized { .. }));

    // The interrupt fires on the next decode and is not fatal.
    let err = session.poll().unwrap_err();
    assert!(matches!(err, MediaError::Stream(SabrError::Interrupted)));

    // Resuming picks up exactly where the stream left off.
    let mut events = Vec::new();
    while let Some(event) = session.poll().unwrap() {
        events.push(event);
    }
    assert!(matches!(events.last(), Some(SessionEvent::SegmentEnded { .. })));
    assert_eq!(session.sink().samples.len(), 1);
}

#[test]
fn test_interrupt_inside_media_payload_is_resumable() {
    init_logging();
    let media = [0x00, 0x00, 0x00, 0x01, 0x65, 0x01];
    let stream = avc_segment_stream(&media);

    // Boundary after the format init and media header parts.
    let two_parts_len = {
        let mut decoder = sabr_core::ump::UmpDecoder::new(SliceSource::new(stream.clone()));
        decoder.decode().unwrap().unwrap();
        decoder.decode().unwrap().unwrap();
        stream.len() - decoder.into_source().remaining()
    };

    // Two framing bytes into the media part, then two payload bytes.
    let source = InterruptingSource {
        inner: SliceSource::new(stream),
        interrupt_after: two_parts_len + 4,
        delivered: 0,
        fired: false,
    };
    let mut session = SabrSession::new(source, video_registry(), RecordingSink::default(), false);

    assert!(matches!(
        session.poll().unwrap().unwrap(),
        SessionEvent::FormatInitialized { .. }
    ));
    assert!(matches!(
        session.poll().unwrap().unwrap(),
        SessionEvent::SegmentStarted { .. }
    ));

    let err = session.poll().unwrap_err();
    assert!(matches!(err, MediaError::Stream(SabrError::Interrupted)));

    // The retried poll must deliver the whole media part, not reparse
    // its remaining payload bytes as a fresh part header.
    let data = session.poll().unwrap().unwrap();
    match data {
        SessionEvent::SegmentData { ref data, .. } => assert_eq!(data.as_ref(), &media[..]),
        other => panic!("expected segment data, got {:?}", other),
    }

    let mut events = Vec::new();
    while let Some(event) = session.poll().unwrap() {
        events.push(event);
    }
    assert!(matches!(events.last(), Some(SessionEvent::SegmentEnded { .. })));
    assert_eq!(session.sink().samples.len(), 1);
    assert_eq!(session.sink().samples[0], &media[..]);
}
