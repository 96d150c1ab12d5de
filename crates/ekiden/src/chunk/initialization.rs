use std::sync::Arc;

use super::{lock, SharedChunkExtractor, TrackOutputProvider};
use crate::{
    error::EkidenResult,
    extractor::{ChunkIndex, DefaultExtractorInput, ExtractorInput},
    format::Format,
    loader::{CancelFlag, Loadable},
    upstream::{DataSource, DataSpec},
};

/// Loads the initialization data of a stream through its orchestrator, so the
/// track formats and the chunk index are known before any media chunk.
///
/// A failed load resumes from the last byte read when retried.
pub struct InitializationChunk {
    data_source: Box<dyn DataSource>,
    data_spec: DataSpec,
    track_format: Format,
    chunk_extractor: SharedChunkExtractor,
    provider: Option<Arc<dyn TrackOutputProvider>>,

    next_load_position: u64,
    chunk_index: Option<ChunkIndex>,
    cancel: CancelFlag,
}

impl InitializationChunk {
    pub fn new(
        data_source: Box<dyn DataSource>,
        data_spec: DataSpec,
        track_format: Format,
        chunk_extractor: SharedChunkExtractor,
    ) -> Self {
        Self {
            data_source,
            data_spec,
            track_format,
            chunk_extractor,
            provider: None,
            next_load_position: 0,
            chunk_index: None,
            cancel: CancelFlag::new(),
        }
    }

    /// Sets where the tracks found in the initialization data are written.
    pub fn init(&mut self, provider: Option<Arc<dyn TrackOutputProvider>>) {
        self.provider = provider;
    }

    pub fn data_spec(&self) -> &DataSpec {
        &self.data_spec
    }

    pub fn track_format(&self) -> &Format {
        &self.track_format
    }

    /// Bytes of the chunk consumed so far.
    pub fn next_load_position(&self) -> u64 {
        self.next_load_position
    }

    pub fn chunk_index(&self) -> Option<&ChunkIndex> {
        self.chunk_index.as_ref()
    }

    pub fn chunk_extractor(&self) -> &SharedChunkExtractor {
        &self.chunk_extractor
    }

    fn load_from_source(&mut self) -> EkidenResult<()> {
        let mut extractor = lock(&self.chunk_extractor);
        if self.next_load_position == 0 {
            extractor.init(self.provider.clone(), None, None);
        }

        let load_spec = self.data_spec.subrange(self.next_load_position);
        if load_spec.is_empty() {
            // The whole range was consumed by an earlier attempt.
            self.chunk_index = extractor.chunk_index().cloned();
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
        self.chunk_index = extractor.chunk_index().cloned();
        result
    }
}

impl Loadable for InitializationChunk {
    fn load(&mut self) -> EkidenResult<()> {
        let result = self.load_from_source();
        self.data_source.close();
        result
    }

    fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }
}
