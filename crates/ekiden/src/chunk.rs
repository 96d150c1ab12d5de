//! Chunked loading through one long-lived extractor.
//!
//! ```text
//!  DataSource ─► InitializationChunk ─┐
//!  DataSource ─► ContainerMediaChunk ─┼─► BundledChunkExtractor ─► BindingTrackOutput ─► Sink
//!                                     │        (one per stream)       (one per track)
//!                                     └── SharedChunkExtractor serializes the loads
//! ```

mod bundled;
mod initialization;
mod media;
mod output;

pub use bundled::BundledChunkExtractor;
pub use initialization::InitializationChunk;
pub use media::{ChunkWindow, ContainerMediaChunk};
pub use output::BaseMediaChunkOutput;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{
    error::{EkidenError, EkidenResult},
    extractor::{
        BundledExtractor, CryptoData, DiscardingTrackOutput, ExtractorInput, SampleFlags,
        TrackOutput,
    },
    format::{mime_types, Format, TrackType},
};

/// A track output shared between the extractor side and its reader.
pub type SharedTrackOutput = Arc<Mutex<dyn TrackOutput + Send>>;

/// One orchestrator per logical stream. Chunks of that stream take the lock
/// for the whole of their load.
pub type SharedChunkExtractor = Arc<Mutex<BundledChunkExtractor>>;

pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Where a track binding currently writes to.
#[derive(Clone, Default)]
pub enum Sink {
    Bound(SharedTrackOutput),
    #[default]
    Discarding,
}

impl Sink {
    pub fn is_discarding(&self) -> bool {
        matches!(self, Sink::Discarding)
    }

    fn with<R>(&mut self, f: impl FnOnce(&mut dyn TrackOutput) -> R) -> R {
        match self {
            Sink::Bound(output) => f(&mut *lock(output)),
            Sink::Discarding => f(&mut DiscardingTrackOutput),
        }
    }
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sink::Bound(_) => f.write_str("Bound"),
            Sink::Discarding => f.write_str("Discarding"),
        }
    }
}

impl TrackOutput for Sink {
    fn format(&mut self, format: Format) {
        self.with(|output| output.format(format))
    }

    fn sample_data(
        &mut self,
        input: &mut dyn ExtractorInput,
        length: usize,
        allow_end_of_input: bool,
    ) -> EkidenResult<usize> {
        self.with(|output| output.sample_data(input, length, allow_end_of_input))
    }

    fn sample_bytes(&mut self, data: &[u8]) {
        self.with(|output| output.sample_bytes(data))
    }

    fn sample_metadata(
        &mut self,
        time_us: i64,
        flags: SampleFlags,
        size: usize,
        offset: usize,
        crypto_data: Option<&CryptoData>,
    ) {
        self.with(|output| output.sample_metadata(time_us, flags, size, offset, crypto_data))
    }
}

/// Hands out the sinks the tracks of a chunk are bound to.
pub trait TrackOutputProvider: Send + Sync {
    fn track(&self, id: u32, track_type: TrackType) -> Sink;
}

/// Builds the orchestrator for a representation.
#[derive(Debug, Clone, Default)]
pub struct ChunkExtractorFactory {
    parse_subtitles_during_extraction: bool,
}

impl ChunkExtractorFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse_subtitles_during_extraction(mut self, parse: bool) -> Self {
        self.parse_subtitles_during_extraction = parse;
        self
    }

    /// Returns `None` for sideloaded subtitle containers, which are read as
    /// whole samples instead of being extracted.
    pub fn create(
        &self,
        primary_track_type: TrackType,
        representation_format: &Format,
    ) -> EkidenResult<Option<BundledChunkExtractor>> {
        let container_mime_type = representation_format.container_mime_type.as_deref();
        if mime_types::is_text(container_mime_type) && !self.parse_subtitles_during_extraction {
            return Ok(None);
        }

        let Some(mime_type) = container_mime_type else {
            return Err(EkidenError::UnrecognizedContainer(
                "missing container MIME type".to_string(),
            ));
        };
        let extractor = BundledExtractor::for_container_mime_type(mime_type)
            .ok_or_else(|| EkidenError::UnrecognizedContainer(mime_type.to_string()))?;

        Ok(Some(BundledChunkExtractor::new(
            extractor,
            primary_track_type,
            representation_format.clone(),
        )))
    }
}
