use bytes::Bytes;
use ekiden::{
    format::mime_types,
    reorder::ReorderingQueue,
    ts::{PassthroughSectionReader, SeiReader, TimestampAdjuster, TrackIdGenerator},
    Format, TrackType,
};

use crate::{AssertWrapper, RecordingOutput};

/// A GA94 closed caption SEI message carrying the given cc constructs.
fn ga94_sei(cc_constructs: &[[u8; 3]]) -> Vec<u8> {
    let mut payload = vec![0xB5, 0x00, 0x31];
    payload.extend_from_slice(b"GA94");
    payload.push(0x03);
    payload.push(0x40 | cc_constructs.len() as u8);
    payload.push(0xFF);
    for construct in cc_constructs {
        payload.extend_from_slice(construct);
    }
    payload.push(0xFF);

    let mut sei = vec![0x04, payload.len() as u8];
    sei.extend_from_slice(&payload);
    sei.push(0x80);
    sei
}

fn cea608_reader() -> (SeiReader, RecordingOutput) {
    let mut reader = SeiReader::new(
        vec![Format::builder()
            .sample_mime_type(mime_types::APPLICATION_CEA608)
            .language("en")
            .accessibility_channel(Some(1))
            .build()],
        mime_types::VIDEO_MP2T,
    );
    let mut output = RecordingOutput::default();
    let mut id_generator = TrackIdGenerator::new(0, 1).with_program_number(1);
    reader.create_tracks(&mut output, &mut id_generator);
    (reader, output)
}

#[test]
fn test_reordering_queue() {
    let mut released = Vec::new();
    let mut queue = ReorderingQueue::new();
    for (timestamp, payload) in [(30, 'c'), (10, 'a'), (20, 'b')] {
        queue.add(timestamp, payload, |t, p| released.push((t, p)));
    }
    assert!(released.is_empty());
    queue.flush(|t, p| released.push((t, p)));
    assert_eq!(released, vec![(10, 'a'), (20, 'b'), (30, 'c')]);

    let mut released = Vec::new();
    let mut queue = ReorderingQueue::with_max_size(2);
    for timestamp in [10, 20, 5] {
        queue.add(timestamp, (), |t, _| released.push(t));
    }
    // The smallest buffered entry goes first, even though 5 is smaller.
    assert_eq!(released, vec![10]);
    assert_eq!(queue.timestamps().collect::<Vec<_>>(), vec![5, 20]);
}

#[test]
fn test_sei_tracks() {
    let (reader, output) = cea608_reader();
    assert_eq!(reader.track_ids(), &[0]);

    let (track_type, queue) = &output.tracks[&0];
    assert_eq!(*track_type, TrackType::Text);
    let format = queue.upstream_format().assert_success();
    assert_eq!(format.id.as_deref(), Some("1/0"));
    assert_eq!(format.container_mime_type.as_deref(), Some(mime_types::VIDEO_MP2T));
    assert_eq!(format.sample_mime_type.as_deref(), Some(mime_types::APPLICATION_CEA608));
    assert_eq!(format.language.as_deref(), Some("en"));
    assert_eq!(format.accessibility_channel, Some(1));
}

#[test]
#[should_panic(expected = "Invalid closed caption MIME type")]
fn test_sei_rejects_other_formats() {
    let mut reader = SeiReader::new(
        vec![Format::builder().sample_mime_type(mime_types::TEXT_VTT).build()],
        mime_types::VIDEO_MP2T,
    );
    reader.create_tracks(
        &mut RecordingOutput::default(),
        &mut TrackIdGenerator::new(0, 1),
    );
}

#[test]
fn test_sei_captions_in_presentation_order() {
    let (mut reader, mut output) = cea608_reader();
    reader.set_reordering_queue_size(Some(4), &mut output);

    for (time_us, construct) in [
        (30, [0xFC, 0x94, 0x2F]),
        (10, [0xFC, 0x94, 0x20]),
        (20, [0xFC, 0xC1, 0xC2]),
    ] {
        reader.consume(time_us, Bytes::from(ga94_sei(&[construct])), &mut output);
    }
    assert!(output.queue(0).is_empty());

    reader.flush(&mut output);
    assert_eq!(output.sample_times(0), vec![10, 20, 30]);
    let first = output.queue(0).samples().next().assert_success();
    assert_eq!(first.data.as_ref(), &[0xFC, 0x94, 0x20]);
}

#[test]
fn test_sei_shrinking_queue_releases() {
    let (mut reader, mut output) = cea608_reader();
    reader.set_reordering_queue_size(Some(2), &mut output);

    let mut nal_unit = vec![0x06];
    nal_unit.extend(ga94_sei(&[[0xFC, 0x80, 0x80]]));
    reader.consume_nal_unit(10, &nal_unit, 1, &mut output);
    reader.consume(20, Bytes::from(ga94_sei(&[[0xFC, 0x80, 0x80]])), &mut output);
    reader.consume(5, Bytes::from(ga94_sei(&[[0xFC, 0x80, 0x80]])), &mut output);
    assert_eq!(output.sample_times(0), vec![10]);

    reader.set_reordering_queue_size(Some(1), &mut output);
    assert_eq!(output.sample_times(0), vec![10, 5]);

    // Cleared entries are never emitted.
    reader.clear();
    reader.flush(&mut output);
    assert_eq!(output.sample_times(0), vec![10, 5]);
}

#[test]
fn test_passthrough_sections() {
    let mut reader = PassthroughSectionReader::new(
        mime_types::APPLICATION_SCTE35,
        mime_types::VIDEO_MP2T,
    );
    let mut output = RecordingOutput::default();
    let mut id_generator = TrackIdGenerator::new(0x100, 0x2000);
    reader.init(&mut output, &mut id_generator);

    let (track_type, queue) = &output.tracks[&0x100];
    assert_eq!(*track_type, TrackType::Metadata);
    assert!(queue.upstream_format().is_some());

    let mut adjuster = TimestampAdjuster::new(Some(1_000_000));
    reader.consume(b"early", &adjuster, &mut output);
    assert!(output.queue(0x100).is_empty());

    // 2 s at 90 kHz.
    adjuster.adjust_ts_timestamp(180_000);
    reader.consume(b"section", &adjuster, &mut output);

    let queue = output.queue(0x100);
    assert_eq!(
        queue.upstream_format().map(|f| f.subsample_offset_us),
        Some(-1_000_000)
    );
    let samples: Vec<_> = queue.samples().collect();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].time_us, 1_000_000);
    assert_eq!(samples[0].data.as_ref(), b"section");
}
