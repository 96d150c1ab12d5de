//! Ogg bitstream extraction for FLAC, Vorbis and Opus payloads.

use std::sync::Arc;

use super::{
    Extractor, ExtractorInput, ExtractorOutput, ReadResult, SampleFlags, SeekMap, TrackOutput,
};
use crate::{
    error::{EkidenError, EkidenResult},
    format::{mime_types, Format, TrackType},
};

const CAPTURE_PATTERN: &[u8; 4] = b"OggS";
const PAGE_HEADER_SIZE: usize = 27;
const MAX_VERIFICATION_BYTES: usize = 8;

const HEADER_TYPE_CONTINUED: u8 = 0x01;
const HEADER_TYPE_BOS: u8 = 0x02;

const OPUS_SAMPLE_RATE: u32 = 48_000;
const OPUS_SEEK_PREROLL_NS: u64 = 80_000_000;

/// The fixed 27 byte header of an Ogg page plus its lacing values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OggPageHeader {
    pub header_type: u8,
    /// Granule position at the end of the last packet completed on this
    /// page, or `-1` if no packet is completed here.
    pub granule_position: i64,
    pub stream_serial_number: u32,
    pub page_sequence_number: u32,
    pub lacing_values: Vec<u8>,
}

impl OggPageHeader {
    fn parse_fixed(bytes: &[u8; PAGE_HEADER_SIZE]) -> EkidenResult<(Self, usize)> {
        if &bytes[0..4] != CAPTURE_PATTERN {
            return Err(EkidenError::malformed("expected OggS capture pattern"));
        }
        if bytes[4] != 0 {
            return Err(EkidenError::malformed(format!(
                "unsupported Ogg stream structure revision {}",
                bytes[4]
            )));
        }

        let header = Self {
            header_type: bytes[5],
            granule_position: i64::from_le_bytes(bytes[6..14].try_into().unwrap_or_default()),
            stream_serial_number: u32::from_le_bytes(bytes[14..18].try_into().unwrap_or_default()),
            page_sequence_number: u32::from_le_bytes(
                bytes[18..22].try_into().unwrap_or_default(),
            ),
            lacing_values: Vec::new(),
        };
        Ok((header, bytes[26] as usize))
    }

    /// Peeks a page header at the peek position.
    ///
    /// Returns `Ok(None)` if the input ends first.
    pub fn peek(input: &mut dyn ExtractorInput) -> EkidenResult<Option<Self>> {
        let mut fixed = [0u8; PAGE_HEADER_SIZE];
        if !input.peek_fully(&mut fixed, true)? {
            return Ok(None);
        }
        let (mut header, segments) = Self::parse_fixed(&fixed)?;

        header.lacing_values = vec![0u8; segments];
        input.peek_fully(&mut header.lacing_values, false)?;
        Ok(Some(header))
    }

    /// Reads a page header, consuming it.
    pub fn read(input: &mut dyn ExtractorInput) -> EkidenResult<Option<Self>> {
        let mut fixed = [0u8; PAGE_HEADER_SIZE];
        if !input.read_fully(&mut fixed, true)? {
            return Ok(None);
        }
        let (mut header, segments) = Self::parse_fixed(&fixed)?;

        header.lacing_values = vec![0u8; segments];
        input.read_fully(&mut header.lacing_values, false)?;
        Ok(Some(header))
    }

    pub fn body_size(&self) -> usize {
        self.lacing_values.iter().map(|&lace| lace as usize).sum()
    }

    pub fn is_continued(&self) -> bool {
        self.header_type & HEADER_TYPE_CONTINUED != 0
    }

    pub fn is_first_page(&self) -> bool {
        self.header_type & HEADER_TYPE_BOS != 0
    }
}

/// Codec carried by an Ogg logical bitstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OggStreamKind {
    Flac,
    Vorbis,
    Opus,
}

impl OggStreamKind {
    /// Probes the first body bytes of the first page. Probes run in a fixed
    /// order and their signatures do not overlap.
    pub fn probe(data: &[u8]) -> Option<Self> {
        if Self::verify_flac(data) {
            Some(Self::Flac)
        } else if Self::verify_vorbis(data) {
            Some(Self::Vorbis)
        } else if Self::verify_opus(data) {
            Some(Self::Opus)
        } else {
            None
        }
    }

    fn verify_flac(data: &[u8]) -> bool {
        data.len() >= 5 && data[0] == 0x7F && &data[1..5] == b"FLAC"
    }

    fn verify_vorbis(data: &[u8]) -> bool {
        data.len() >= 7 && data[0] == 0x01 && &data[1..7] == b"vorbis"
    }

    fn verify_opus(data: &[u8]) -> bool {
        data.len() >= 8 && &data[..8] == b"OpusHead"
    }

    pub fn sample_mime_type(&self) -> &'static str {
        match self {
            Self::Flac => mime_types::AUDIO_FLAC,
            Self::Vorbis => mime_types::AUDIO_VORBIS,
            Self::Opus => mime_types::AUDIO_OPUS,
        }
    }
}

/// Reassembles packets from the pages of one logical bitstream.
#[derive(Debug, Default)]
struct OggPacketReader {
    partial: Vec<u8>,
    /// Drop the tail of a packet that started before the current position.
    skip_continued: bool,
}

impl OggPacketReader {
    fn reset(&mut self, skip_continued: bool) {
        self.partial.clear();
        self.skip_continued = skip_continued;
    }

    /// Reads one page and returns the packets completed on it.
    fn read_page(
        &mut self,
        input: &mut dyn ExtractorInput,
    ) -> EkidenResult<Option<(OggPageHeader, Vec<Vec<u8>>)>> {
        let Some(header) = OggPageHeader::read(input)? else {
            return Ok(None);
        };

        let mut body = vec![0u8; header.body_size()];
        input.read_fully(&mut body, false)?;

        if !header.is_continued() && !self.partial.is_empty() {
            log::warn!(
                "Dropping {} bytes of an unterminated Ogg packet",
                self.partial.len()
            );
            self.partial.clear();
        }
        let mut dropping = self.skip_continued && header.is_continued();
        self.skip_continued = false;

        let mut packets = Vec::new();
        let mut offset = 0;
        for &lace in &header.lacing_values {
            let end = offset + lace as usize;
            if !dropping {
                self.partial.extend_from_slice(&body[offset..end]);
            }
            offset = end;

            if lace < 255 {
                if dropping {
                    dropping = false;
                } else {
                    packets.push(std::mem::take(&mut self.partial));
                }
            }
        }

        Ok(Some((header, packets)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Headers,
    Samples,
}

/// Extracts the single audio track of an Ogg FLAC, Vorbis or Opus stream.
#[derive(Debug)]
pub struct OggExtractor {
    kind: Option<OggStreamKind>,
    track_initialized: bool,

    state: State,
    packets: OggPacketReader,
    header_packets: Vec<Vec<u8>>,
    sample_rate: u32,
    channel_count: u32,
    pre_skip: u16,

    current_granule: Option<i64>,
}

impl Default for OggExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl OggExtractor {
    pub fn new() -> Self {
        Self {
            kind: None,
            track_initialized: false,
            state: State::Headers,
            packets: OggPacketReader::default(),
            header_packets: Vec::new(),
            sample_rate: 0,
            channel_count: 0,
            pre_skip: 0,
            current_granule: Some(0),
        }
    }

    pub fn stream_kind(&self) -> Option<OggStreamKind> {
        self.kind
    }

    fn sniff_internal(&mut self, input: &mut dyn ExtractorInput) -> EkidenResult<bool> {
        let Some(header) = OggPageHeader::peek(input)? else {
            return Ok(false);
        };
        if !header.is_first_page() {
            return Ok(false);
        }

        let length = header.body_size().min(MAX_VERIFICATION_BYTES);
        let mut scratch = vec![0u8; length];
        input.peek_fully(&mut scratch, false)?;

        self.kind = OggStreamKind::probe(&scratch);
        if let Some(kind) = self.kind {
            log::debug!("Detected {kind:?} Ogg bitstream");
        }
        Ok(self.kind.is_some())
    }

    /// Consumes one header packet. Returns the track format once the last
    /// header packet has been seen.
    fn read_header_packet(&mut self, packet: Vec<u8>) -> EkidenResult<Option<Format>> {
        let Some(kind) = self.kind else {
            return Ok(None);
        };

        match kind {
            OggStreamKind::Opus => {
                if self.header_packets.is_empty() {
                    if packet.len() < 19 || &packet[..8] != b"OpusHead" {
                        return Err(EkidenError::malformed("invalid OpusHead packet"));
                    }
                    self.channel_count = packet[9] as u32;
                    self.pre_skip = u16::from_le_bytes([packet[10], packet[11]]);
                    self.sample_rate = OPUS_SAMPLE_RATE;
                    self.header_packets.push(packet);
                    return Ok(None);
                }
                // OpusTags closes the headers.
                let pre_skip_ns = self.pre_skip as u64 * 1_000_000_000 / OPUS_SAMPLE_RATE as u64;
                let initialization_data = vec![
                    Arc::new(self.header_packets[0].clone()),
                    Arc::new(pre_skip_ns.to_le_bytes().to_vec()),
                    Arc::new(OPUS_SEEK_PREROLL_NS.to_le_bytes().to_vec()),
                ];
                Ok(Some(self.build_format(initialization_data)))
            }
            OggStreamKind::Vorbis => {
                if packet.first().map_or(true, |b| b & 0x01 == 0) {
                    return Err(EkidenError::malformed("expected a Vorbis header packet"));
                }
                if packet[0] == 0x01 {
                    if packet.len() < 16 {
                        return Err(EkidenError::malformed("invalid Vorbis identification header"));
                    }
                    self.channel_count = packet[11] as u32;
                    self.sample_rate =
                        u32::from_le_bytes([packet[12], packet[13], packet[14], packet[15]]);
                }
                self.header_packets.push(packet);
                if self.header_packets.len() < 3 {
                    return Ok(None);
                }
                // Identification and setup headers.
                let initialization_data = vec![
                    Arc::new(self.header_packets[0].clone()),
                    Arc::new(self.header_packets[2].clone()),
                ];
                Ok(Some(self.build_format(initialization_data)))
            }
            OggStreamKind::Flac => {
                if self.header_packets.is_empty() {
                    // 0x7F "FLAC" version(2) count(2) "fLaC" block header(4) STREAMINFO(34)
                    if packet.len() < 51 || &packet[9..13] != b"fLaC" {
                        return Err(EkidenError::malformed("invalid Ogg FLAC mapping header"));
                    }
                    let info = &packet[17..51];
                    self.sample_rate = ((info[10] as u32) << 12)
                        | ((info[11] as u32) << 4)
                        | ((info[12] as u32) >> 4);
                    self.channel_count = (((info[12] >> 1) & 0x07) + 1) as u32;
                    self.header_packets.push(packet);
                    return Ok(None);
                }
                self.header_packets.push(packet);
                Ok(None)
            }
        }
    }

    fn build_format(&self, initialization_data: Vec<Arc<Vec<u8>>>) -> Format {
        let mut builder = Format::builder()
            .container_mime_type(mime_types::AUDIO_OGG)
            .initialization_data(initialization_data)
            .channel_count(self.channel_count);
        if let Some(kind) = self.kind {
            builder = builder.sample_mime_type(kind.sample_mime_type());
        }
        if self.sample_rate > 0 {
            builder = builder.sample_rate(self.sample_rate);
        }
        builder.build()
    }

    /// Number of granules a packet covers, if it can be told from the packet.
    fn packet_granules(&self, packet: &[u8]) -> Option<i64> {
        match self.kind? {
            OggStreamKind::Opus => opus_packet_samples(packet),
            OggStreamKind::Flac => flac_frame_block_size(packet),
            OggStreamKind::Vorbis => None,
        }
    }

    fn granule_to_us(&self, granule: i64) -> i64 {
        if self.sample_rate == 0 {
            return 0;
        }
        scale(granule, 1_000_000, self.sample_rate as i64)
    }

    fn write_sample(&mut self, track: &mut dyn TrackOutput, packet: &[u8]) {
        let Some(granule) = self.current_granule else {
            return;
        };
        track.sample_bytes(packet);
        track.sample_metadata(
            self.granule_to_us(granule),
            SampleFlags::KEY_FRAME,
            packet.len(),
            0,
            None,
        );
        // Packets of unknown length share the time of the page start.
        self.current_granule =
            Some(granule.saturating_add(self.packet_granules(packet).unwrap_or(0)));
    }
}

/// `value * multiplier / divisor`, clamped to the `i64` range.
///
/// Granule positions use the full 64 bits, so the product is taken in `i128`.
fn scale(value: i64, multiplier: i64, divisor: i64) -> i64 {
    let scaled = value as i128 * multiplier as i128 / divisor as i128;
    scaled.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

impl Extractor for OggExtractor {
    fn sniff(&mut self, input: &mut dyn ExtractorInput) -> EkidenResult<bool> {
        let result = match self.sniff_internal(input) {
            Err(EkidenError::MalformedContainer(_) | EkidenError::EndOfInput) => Ok(false),
            result => result,
        };
        input.reset_peek_position();
        result
    }

    fn init(&mut self, _output: &mut dyn ExtractorOutput) {}

    fn read(
        &mut self,
        input: &mut dyn ExtractorInput,
        output: &mut dyn ExtractorOutput,
    ) -> EkidenResult<ReadResult> {
        if self.kind.is_none() {
            let detected = self.sniff_internal(input);
            input.reset_peek_position();
            if !detected? {
                return Err(EkidenError::malformed("Failed to determine bitstream type"));
            }
        }
        if !self.track_initialized {
            output.track(0, TrackType::Audio);
            self.track_initialized = true;
        }

        let Some((header, packets)) = self.packets.read_page(input)? else {
            return Ok(ReadResult::EndOfInput);
        };

        for packet in packets {
            match self.state {
                State::Headers => {
                    // FLAC frames start with the 0xFFF8 sync code.
                    let is_flac_frame = self.kind == Some(OggStreamKind::Flac)
                        && !self.header_packets.is_empty()
                        && packet.first() == Some(&0xFF);
                    if is_flac_frame {
                        let format = self.build_format(
                            self.header_packets.iter().cloned().map(Arc::new).collect(),
                        );
                        self.finish_headers(output, format);
                        let track = output.track(0, TrackType::Audio);
                        self.write_sample(track, &packet);
                        continue;
                    }

                    if let Some(format) = self.read_header_packet(packet)? {
                        self.finish_headers(output, format);
                    }
                }
                State::Samples => {
                    let track = output.track(0, TrackType::Audio);
                    self.write_sample(track, &packet);
                }
            }
        }

        if header.granule_position >= 0 && self.state == State::Samples {
            self.current_granule = Some(header.granule_position);
        }
        Ok(ReadResult::Continue)
    }

    fn seek(&mut self, position: u64, time_us: i64) {
        if position == 0 {
            self.state = State::Headers;
            self.header_packets.clear();
            self.packets.reset(false);
            self.current_granule = Some(0);
            return;
        }

        self.packets.reset(true);
        self.current_granule = (self.sample_rate > 0)
            .then(|| scale(time_us, self.sample_rate as i64, 1_000_000));
    }
}

impl OggExtractor {
    fn finish_headers(&mut self, output: &mut dyn ExtractorOutput, format: Format) {
        log::debug!(
            "Ogg headers parsed: {} packets, {} Hz, {} channels",
            self.header_packets.len(),
            self.sample_rate,
            self.channel_count
        );
        output.track(0, TrackType::Audio).format(format);
        // Tracks end once the format is known.
        output.end_tracks();
        output.seek_map(SeekMap::Unseekable { duration_us: None });
        self.state = State::Samples;
        self.current_granule = Some(0);
    }
}

/// Samples at 48 kHz in an Opus packet, read from its TOC byte.
fn opus_packet_samples(packet: &[u8]) -> Option<i64> {
    let toc = *packet.first()?;
    let frames = match toc & 0x03 {
        0 => 1,
        1 | 2 => 2,
        _ => (*packet.get(1)? & 0x3F) as i64,
    };

    let config = toc >> 3;
    let length = config & 0x03;
    // Frame durations in units of 2.5 ms.
    let frame_units = if config >= 16 {
        1 << length
    } else if config >= 12 {
        if length & 0x01 == 1 {
            8
        } else {
            4
        }
    } else if length == 3 {
        24
    } else {
        4 << length
    };

    Some(frames * frame_units * 120)
}

/// Block size of a FLAC frame when it is encoded in the frame header's
/// fixed part.
fn flac_frame_block_size(packet: &[u8]) -> Option<i64> {
    if packet.len() < 3 || packet[0] != 0xFF || packet[1] & 0xFE != 0xF8 {
        return None;
    }

    match packet[2] >> 4 {
        1 => Some(192),
        n @ 2..=5 => Some(576 << (n - 2)),
        n @ 8..=15 => Some(256 << (n - 8)),
        _ => None,
    }
}
