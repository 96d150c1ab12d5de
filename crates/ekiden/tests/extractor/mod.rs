use ekiden::{
    extractor::{
        sniff_extractor, BundledExtractor, DefaultExtractorInput, ReadResult, SeekMap,
        IMAGE_TRACK_ID,
    },
    format::mime_types,
    upstream::MemoryDataSource,
    DataSource, DataSpec, EkidenError, Extractor, ExtractorInput, TrackType,
};

use crate::{AssertWrapper, RecordingOutput};

fn ogg_page(header_type: u8, granule_position: i64, sequence: u32, packets: &[&[u8]]) -> Vec<u8> {
    let mut lacing_values = Vec::new();
    for packet in packets {
        lacing_values.extend(std::iter::repeat(255u8).take(packet.len() / 255));
        lacing_values.push((packet.len() % 255) as u8);
    }

    let mut page = b"OggS".to_vec();
    page.push(0);
    page.push(header_type);
    page.extend_from_slice(&granule_position.to_le_bytes());
    page.extend_from_slice(&1u32.to_le_bytes());
    page.extend_from_slice(&sequence.to_le_bytes());
    // Checksum
    page.extend_from_slice(&0u32.to_le_bytes());
    page.push(lacing_values.len() as u8);
    page.extend_from_slice(&lacing_values);
    for packet in packets {
        page.extend_from_slice(packet);
    }
    page
}

fn opus_head() -> Vec<u8> {
    let mut head = b"OpusHead".to_vec();
    head.push(1);
    head.push(2);
    head.extend_from_slice(&312u16.to_le_bytes());
    head.extend_from_slice(&48_000u32.to_le_bytes());
    head.extend_from_slice(&0u16.to_le_bytes());
    head.push(0);
    head
}

pub(crate) fn opus_stream() -> Vec<u8> {
    let mut tags = b"OpusTags".to_vec();
    tags.extend_from_slice(&0u32.to_le_bytes());
    tags.extend_from_slice(&0u32.to_le_bytes());

    let mut stream = ogg_page(0x02, 0, 0, &[&opus_head()]);
    stream.extend(ogg_page(0x00, 0, 1, &[&tags]));
    // 20 ms CELT packets.
    stream.extend(ogg_page(0x00, 1920, 2, &[&[0xF8, 0xAA, 0xBB], &[0xF8, 0xCC]]));
    stream.extend(ogg_page(0x04, 2880, 3, &[&[0xF8, 0xDD]]));
    stream
}

fn extract(data: &[u8]) -> (BundledExtractor, RecordingOutput) {
    let mut source = MemoryDataSource::new(data.to_vec());
    let length = source.open(&DataSpec::default()).assert_success();
    let mut input = DefaultExtractorInput::new(&mut source, 0, length);

    let mut extractor = sniff_extractor(&mut input).assert_success();
    assert_eq!(input.position(), 0);
    assert_eq!(input.peek_position(), 0);

    let mut output = RecordingOutput::default();
    extractor.init(&mut output);
    while extractor.read(&mut input, &mut output).assert_success() == ReadResult::Continue {}
    (extractor, output)
}

#[test]
fn test_sniff_is_repeatable() {
    let data = opus_stream();
    let mut source = MemoryDataSource::new(data);
    let length = source.open(&DataSpec::default()).assert_success();
    let mut input = DefaultExtractorInput::new(&mut source, 0, length);

    for _ in 0..2 {
        let mut ogg = BundledExtractor::ogg();
        assert!(ogg.sniff(&mut input).assert_success());
        let mut png = BundledExtractor::png();
        assert!(!png.sniff(&mut input).assert_success());
        assert_eq!(input.peek_position(), 0);
    }
}

#[test]
fn test_extract_opus() {
    let (extractor, output) = extract(&opus_stream());
    assert_eq!(extractor.name(), "ogg");
    assert!(output.tracks_ended);
    assert_eq!(
        output.seek_map,
        Some(SeekMap::Unseekable { duration_us: None })
    );

    let (track_type, queue) = &output.tracks[&0];
    assert_eq!(*track_type, TrackType::Audio);

    let format = queue.upstream_format().assert_success();
    assert_eq!(format.container_mime_type.as_deref(), Some(mime_types::AUDIO_OGG));
    assert_eq!(format.sample_mime_type.as_deref(), Some(mime_types::AUDIO_OPUS));
    assert_eq!(format.channel_count, Some(2));
    assert_eq!(format.sample_rate, Some(48_000));
    assert_eq!(format.initialization_data.len(), 3);
    assert_eq!(format.initialization_data[0].as_slice(), opus_head().as_slice());
    // 312 samples of pre-skip at 48 kHz.
    assert_eq!(
        format.initialization_data[1].as_slice(),
        6_500_000u64.to_le_bytes().as_slice()
    );

    assert_eq!(output.sample_times(0), vec![0, 20_000, 40_000]);
    let data: Vec<_> = queue.samples().map(|sample| sample.data.to_vec()).collect();
    assert_eq!(data, vec![vec![0xF8, 0xAA, 0xBB], vec![0xF8, 0xCC], vec![0xF8, 0xDD]]);
}

#[test]
fn test_extract_opus_large_granule() {
    let mut tags = b"OpusTags".to_vec();
    tags.extend_from_slice(&0u32.to_le_bytes());
    tags.extend_from_slice(&0u32.to_le_bytes());

    let mut stream = ogg_page(0x02, 0, 0, &[&opus_head()]);
    stream.extend(ogg_page(0x00, 0, 1, &[&tags]));
    stream.extend(ogg_page(0x00, 1 << 50, 2, &[&[0xF8, 0xAA]]));
    stream.extend(ogg_page(0x00, 1 << 60, 3, &[&[0xF8, 0xBB]]));
    stream.extend(ogg_page(0x04, i64::MAX, 4, &[&[0xF8, 0xCC], &[0xF8, 0xDD]]));

    let (_, output) = extract(&stream);
    assert_eq!(
        output.sample_times(0),
        vec![0, 23_456_248_059_221_333, i64::MAX, i64::MAX]
    );
}

#[test]
fn test_extract_png() {
    let mut image = vec![0x89, 0x50, 0x4E, 0x47];
    image.resize(2_500, 0x42);

    let (extractor, output) = extract(&image);
    assert_eq!(extractor.name(), "png");

    let queue = output.queue(IMAGE_TRACK_ID);
    assert_eq!(
        queue.upstream_format().and_then(|f| f.container_mime_type.as_deref()),
        Some(mime_types::IMAGE_PNG)
    );
    let samples: Vec<_> = queue.samples().collect();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].time_us, 0);
    assert_eq!(samples[0].data.len(), 2_500);
}

#[test]
fn test_unrecognized_input() {
    let mut source = MemoryDataSource::new(b"#EXTM3U\n".to_vec());
    let length = source.open(&DataSpec::default()).assert_success();
    let mut input = DefaultExtractorInput::new(&mut source, 0, length);

    assert!(matches!(
        sniff_extractor(&mut input),
        Err(EkidenError::UnrecognizedContainer(_))
    ));
    assert_eq!(input.peek_position(), 0);
}

#[test]
fn test_ogg_without_known_bitstream() {
    let stream = ogg_page(0x02, 0, 0, &[b"Speex   version"]);
    let mut source = MemoryDataSource::new(stream);
    let length = source.open(&DataSpec::default()).assert_success();
    let mut input = DefaultExtractorInput::new(&mut source, 0, length);

    let mut extractor = BundledExtractor::ogg();
    let mut output = RecordingOutput::default();
    extractor.init(&mut output);
    assert!(matches!(
        extractor.read(&mut input, &mut output),
        Err(EkidenError::MalformedContainer(_))
    ));
}
