use std::sync::Arc;

use super::{lock, BaseMediaChunkOutput, SharedChunkExtractor, TrackOutputProvider};
use crate::{
    error::EkidenResult,
    extractor::{DefaultExtractorInput, ExtractorInput},
    format::Format,
    loader::{CancelFlag, Loadable},
    upstream::{DataSource, DataSpec},
};

/// Presentation window of a media chunk, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkWindow {
    pub start_time_us: i64,
    pub end_time_us: Option<i64>,
    /// Start of the part of the chunk that is played, if clipped.
    pub clipped_start_time_us: Option<i64>,
    /// End of the part of the chunk that is played, if clipped.
    pub clipped_end_time_us: Option<i64>,
}

/// A media chunk whose samples are extracted by the stream's shared
/// orchestrator.
pub struct ContainerMediaChunk {
    data_source: Box<dyn DataSource>,
    data_spec: DataSpec,
    track_format: Format,
    window: ChunkWindow,
    chunk_index: u64,
    sample_offset_us: i64,
    chunk_extractor: SharedChunkExtractor,

    output: Option<Arc<BaseMediaChunkOutput>>,
    first_sample_indices: Vec<usize>,

    next_load_position: u64,
    load_completed: bool,
    cancel: CancelFlag,
}

impl ContainerMediaChunk {
    pub fn new(
        data_source: Box<dyn DataSource>,
        data_spec: DataSpec,
        track_format: Format,
        window: ChunkWindow,
        chunk_index: u64,
        sample_offset_us: i64,
        chunk_extractor: SharedChunkExtractor,
    ) -> Self {
        Self {
            data_source,
            data_spec,
            track_format,
            window,
            chunk_index,
            sample_offset_us,
            chunk_extractor,
            output: None,
            first_sample_indices: Vec::new(),
            next_load_position: 0,
            load_completed: false,
            cancel: CancelFlag::new(),
        }
    }

    /// Binds the chunk to the queues it is loaded into and records their
    /// current write indices.
    pub fn init(&mut self, output: Arc<BaseMediaChunkOutput>) {
        self.first_sample_indices = output.write_indices();
        self.output = Some(output);
    }

    /// Write index of the first sample of this chunk in queue `track_index`.
    pub fn first_sample_index(&self, track_index: usize) -> Option<usize> {
        self.first_sample_indices.get(track_index).copied()
    }

    pub fn window(&self) -> &ChunkWindow {
        &self.window
    }

    pub fn track_format(&self) -> &Format {
        &self.track_format
    }

    pub fn chunk_index(&self) -> u64 {
        self.chunk_index
    }

    pub fn next_chunk_index(&self) -> u64 {
        self.chunk_index + 1
    }

    pub fn next_load_position(&self) -> u64 {
        self.next_load_position
    }

    pub fn is_load_completed(&self) -> bool {
        self.load_completed
    }

    fn load_from_source(&mut self) -> EkidenResult<()> {
        let mut extractor = lock(&self.chunk_extractor);
        if self.next_load_position == 0 {
            let output = self
                .output
                .clone()
                .unwrap_or_else(|| panic!("chunk {} loaded before init", self.chunk_index));
            output.set_sample_offset_us(self.sample_offset_us);

            let offset = self.sample_offset_us;
            let provider: Arc<dyn TrackOutputProvider> = output;
            extractor.init(
                Some(provider),
                self.window.clipped_start_time_us.map(|time| time - offset),
                self.window.clipped_end_time_us.map(|time| time - offset),
            );
        }

        let load_spec = self.data_spec.subrange(self.next_load_position);
        if load_spec.is_empty() {
            // The whole range was consumed by an earlier attempt.
            return Ok(());
        }
        let length = self.data_source.open(&load_spec)?;
        let mut input = DefaultExtractorInput::new(
            &mut self.data_source,
            load_spec.position,
            length.map(|length| length + load_spec.position),
        );

        let mut result = Ok(());
        while !self.cancel.is_canceled() {
            match extractor.read(&mut input) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }

        self.next_load_position = input.position() - self.data_spec.position;
        result
    }
}

impl Loadable for ContainerMediaChunk {
    fn load(&mut self) -> EkidenResult<()> {
        let result = self.load_from_source();
        self.data_source.close();
        self.load_completed = result.is_ok() && !self.cancel.is_canceled();
        result
    }

    fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }
}
