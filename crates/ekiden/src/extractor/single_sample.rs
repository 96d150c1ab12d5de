use super::{Extractor, ExtractorInput, ExtractorOutput, ReadResult, SampleFlags, SeekMap};
use crate::{
    error::{EkidenError, EkidenResult},
    format::{mime_types, Format, TrackType},
};

/// Track id of the image track written by [`SingleSampleExtractor`].
pub const IMAGE_TRACK_ID: u32 = 1024;

const FIXED_READ_LENGTH: usize = 1024;

const PNG_FILE_SIGNATURE: u16 = 0x8950;
const JPEG_FILE_SIGNATURE: u16 = 0xFFD8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Reading,
    Ended,
}

/// Extracts a whole file identified by a two byte signature as one sample.
#[derive(Debug)]
pub struct SingleSampleExtractor {
    signature: u16,
    container_mime_type: &'static str,

    state: State,
    size: usize,
}

impl SingleSampleExtractor {
    pub fn new(signature: u16, container_mime_type: &'static str) -> Self {
        Self {
            signature,
            container_mime_type,
            state: State::Reading,
            size: 0,
        }
    }

    pub fn png() -> Self {
        Self::new(PNG_FILE_SIGNATURE, mime_types::IMAGE_PNG)
    }

    pub fn jpeg() -> Self {
        Self::new(JPEG_FILE_SIGNATURE, mime_types::IMAGE_JPEG)
    }

    pub fn container_mime_type(&self) -> &'static str {
        self.container_mime_type
    }
}

impl Extractor for SingleSampleExtractor {
    fn sniff(&mut self, input: &mut dyn ExtractorInput) -> EkidenResult<bool> {
        let mut signature = [0u8; 2];
        let peeked = match input.peek_fully(&mut signature, true) {
            Err(EkidenError::EndOfInput) => Ok(false),
            result => result,
        };
        input.reset_peek_position();

        Ok(peeked? && u16::from_be_bytes(signature) == self.signature)
    }

    fn init(&mut self, output: &mut dyn ExtractorOutput) {
        output.track(IMAGE_TRACK_ID, TrackType::Image).format(
            Format::builder()
                .container_mime_type(self.container_mime_type)
                .build(),
        );
        output.end_tracks();
        output.seek_map(SeekMap::Unseekable { duration_us: None });
        self.state = State::Reading;
    }

    fn read(
        &mut self,
        input: &mut dyn ExtractorInput,
        output: &mut dyn ExtractorOutput,
    ) -> EkidenResult<ReadResult> {
        if self.state == State::Ended {
            return Ok(ReadResult::EndOfInput);
        }

        let track = output.track(IMAGE_TRACK_ID, TrackType::Image);
        let read = track.sample_data(input, FIXED_READ_LENGTH, true)?;
        if read == 0 {
            track.sample_metadata(0, SampleFlags::KEY_FRAME, self.size, 0, None);
            self.state = State::Ended;
            self.size = 0;
            return Ok(ReadResult::EndOfInput);
        }

        self.size += read;
        Ok(ReadResult::Continue)
    }

    fn seek(&mut self, position: u64, _time_us: i64) {
        if position == 0 {
            self.state = State::Reading;
            self.size = 0;
        }
    }
}
