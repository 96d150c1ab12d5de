use bitflags::bitflags;

use super::ExtractorInput;
use crate::{
    error::{EkidenError, EkidenResult},
    format::{Format, TrackType},
};

bitflags! {
    /// Flags attached to each committed sample.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct SampleFlags: u32 {
        /// The sample can be decoded without any other sample.
        const KEY_FRAME   = 1 << 0;
        const LAST_SAMPLE = 1 << 29;
        /// The sample bytes need [`CryptoData`] to be decoded.
        const ENCRYPTED   = 1 << 30;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoMode {
    Unencrypted,
    AesCtr,
    AesCbc,
}

/// Decryption parameters of one encrypted sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoData {
    pub mode: CryptoMode,
    pub key_id: Vec<u8>,
    pub encrypted_blocks: u32,
    pub clear_blocks: u32,
}

/// Seek table mapping presentation times to byte ranges of a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkIndex {
    pub sizes: Vec<u32>,
    pub offsets: Vec<u64>,
    pub durations_us: Vec<i64>,
    pub times_us: Vec<i64>,
}

impl ChunkIndex {
    pub fn new(sizes: Vec<u32>, offsets: Vec<u64>, durations_us: Vec<i64>, times_us: Vec<i64>) -> Self {
        assert!(
            sizes.len() == offsets.len()
                && offsets.len() == durations_us.len()
                && durations_us.len() == times_us.len(),
            "chunk index columns differ in length"
        );
        Self {
            sizes,
            offsets,
            durations_us,
            times_us,
        }
    }

    pub fn len(&self) -> usize {
        self.times_us.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times_us.is_empty()
    }

    /// Index of the chunk containing `time_us`, clamped to the first chunk.
    pub fn chunk_index(&self, time_us: i64) -> usize {
        self.times_us
            .partition_point(|&start| start <= time_us)
            .saturating_sub(1)
    }

    pub fn duration_us(&self) -> i64 {
        match (self.times_us.last(), self.durations_us.last()) {
            (Some(start), Some(duration)) => start + duration,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeekMap {
    Unseekable { duration_us: Option<i64> },
    ChunkIndex(ChunkIndex),
}

impl SeekMap {
    pub fn is_seekable(&self) -> bool {
        matches!(self, Self::ChunkIndex(index) if !index.is_empty())
    }

    pub fn duration_us(&self) -> Option<i64> {
        match self {
            Self::Unseekable { duration_us } => *duration_us,
            Self::ChunkIndex(index) => Some(index.duration_us()),
        }
    }
}

/// Receives the format and samples of one track.
pub trait TrackOutput {
    fn format(&mut self, format: Format);

    /// Appends up to `length` bytes of sample data read from `input`.
    ///
    /// Returns the number of bytes consumed, or `0` if the input ended and
    /// `allow_end_of_input` is set.
    fn sample_data(
        &mut self,
        input: &mut dyn ExtractorInput,
        length: usize,
        allow_end_of_input: bool,
    ) -> EkidenResult<usize>;

    /// Appends sample data that is already in memory.
    fn sample_bytes(&mut self, data: &[u8]);

    /// Commits a sample made of the `size` bytes that end `offset` bytes
    /// before the last byte appended.
    fn sample_metadata(
        &mut self,
        time_us: i64,
        flags: SampleFlags,
        size: usize,
        offset: usize,
        crypto_data: Option<&CryptoData>,
    );
}

/// Receives the tracks an extractor discovers.
pub trait ExtractorOutput {
    /// Returns the output of track `id`, creating it on first sight.
    fn track(&mut self, id: u32, track_type: TrackType) -> &mut dyn TrackOutput;

    /// No track will be created after this call.
    fn end_tracks(&mut self);

    fn seek_map(&mut self, seek_map: SeekMap);
}

/// A [`TrackOutput`] that drops everything written to it.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardingTrackOutput;

impl TrackOutput for DiscardingTrackOutput {
    fn format(&mut self, _format: Format) {}

    fn sample_data(
        &mut self,
        input: &mut dyn ExtractorInput,
        length: usize,
        allow_end_of_input: bool,
    ) -> EkidenResult<usize> {
        let skipped = input.skip(length)?;
        if skipped == 0 && length > 0 && !allow_end_of_input {
            return Err(EkidenError::EndOfInput);
        }
        Ok(skipped)
    }

    fn sample_bytes(&mut self, _data: &[u8]) {}

    fn sample_metadata(
        &mut self,
        _time_us: i64,
        _flags: SampleFlags,
        _size: usize,
        _offset: usize,
        _crypto_data: Option<&CryptoData>,
    ) {
    }
}
