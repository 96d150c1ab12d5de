use std::{collections::BTreeMap, sync::Arc};

use super::{Sink, TrackOutputProvider};
use crate::{
    error::EkidenResult,
    extractor::{
        ChunkIndex, CryptoData, Extractor, ExtractorInput, ExtractorOutput, ReadResult,
        SampleFlags, SeekMap, TrackOutput,
    },
    format::{Format, TrackType},
};

/// Runs one extractor across the chunks of a stream.
///
/// The extractor is initialized on the first [`init`](Self::init) only. Later
/// calls seek it and rebind every known track to the new provider and chunk
/// end time, so header state survives chunk boundaries while samples past the
/// end of a chunk are dropped.
pub struct BundledChunkExtractor {
    extractor: Box<dyn Extractor + Send>,
    extractor_initialized: bool,
    outputs: BindingOutputs,
}

struct BindingOutputs {
    primary_track_type: TrackType,
    primary_track_manifest_format: Format,

    bindings: BTreeMap<u32, BindingTrackOutput>,
    provider: Option<Arc<dyn TrackOutputProvider>>,
    end_time_us: Option<i64>,

    seek_map: Option<SeekMap>,
    sample_formats: Option<Vec<Format>>,
}

impl BundledChunkExtractor {
    pub fn new(
        extractor: impl Extractor + Send + 'static,
        primary_track_type: TrackType,
        primary_track_manifest_format: Format,
    ) -> Self {
        Self {
            extractor: Box::new(extractor),
            extractor_initialized: false,
            outputs: BindingOutputs {
                primary_track_type,
                primary_track_manifest_format,
                bindings: BTreeMap::new(),
                provider: None,
                end_time_us: None,
                seek_map: None,
                sample_formats: None,
            },
        }
    }

    /// Prepares the extractor for a new chunk.
    ///
    /// Without a provider every track discards what it receives.
    pub fn init(
        &mut self,
        provider: Option<Arc<dyn TrackOutputProvider>>,
        start_time_us: Option<i64>,
        end_time_us: Option<i64>,
    ) {
        self.outputs.provider = provider;
        self.outputs.end_time_us = end_time_us;

        if !self.extractor_initialized {
            self.extractor.init(&mut self.outputs);
            if let Some(start_time_us) = start_time_us {
                self.extractor.seek(0, start_time_us);
            }
            self.extractor_initialized = true;
            return;
        }

        self.extractor.seek(0, start_time_us.unwrap_or(0));
        let provider = self.outputs.provider.as_deref();
        for binding in self.outputs.bindings.values_mut() {
            binding.bind(provider, end_time_us);
        }
    }

    /// Reads one step from `input`. Returns whether more data is expected.
    ///
    /// # Panics
    ///
    /// If called before [`init`](Self::init), or if the extractor asks for
    /// a seek, which a chunk cannot serve.
    pub fn read(&mut self, input: &mut dyn ExtractorInput) -> EkidenResult<bool> {
        assert!(
            self.extractor_initialized,
            "BundledChunkExtractor::read called before init"
        );

        let result = self.extractor.read(input, &mut self.outputs)?;
        assert!(
            !matches!(result, ReadResult::Seek(_)),
            "extractor requested a seek while reading a chunk"
        );
        Ok(result == ReadResult::Continue)
    }

    pub fn seek_map(&self) -> Option<&SeekMap> {
        self.outputs.seek_map.as_ref()
    }

    /// The chunk index, if the stream carries one.
    pub fn chunk_index(&self) -> Option<&ChunkIndex> {
        match self.outputs.seek_map.as_ref()? {
            SeekMap::ChunkIndex(index) => Some(index),
            SeekMap::Unseekable { .. } => None,
        }
    }

    /// Formats of every track in id order, once the tracks have ended.
    pub fn sample_formats(&self) -> Option<&[Format]> {
        self.outputs.sample_formats.as_deref()
    }

    pub fn release(&mut self) {
        self.extractor.release();
    }
}

impl ExtractorOutput for BindingOutputs {
    fn track(&mut self, id: u32, track_type: TrackType) -> &mut dyn TrackOutput {
        let Self {
            primary_track_type,
            primary_track_manifest_format,
            bindings,
            provider,
            end_time_us,
            sample_formats,
            ..
        } = self;

        bindings.entry(id).or_insert_with(|| {
            // Tracks are fixed once the formats have been collected.
            assert!(
                sample_formats.is_none(),
                "track {id} appeared after the tracks ended"
            );

            let manifest_format = (track_type == *primary_track_type)
                .then(|| primary_track_manifest_format.clone());
            let mut binding = BindingTrackOutput::new(id, track_type, manifest_format);
            binding.bind(provider.as_deref(), *end_time_us);
            binding
        })
    }

    fn end_tracks(&mut self) {
        let formats = self
            .bindings
            .values()
            .map(|binding| {
                binding.sample_format.clone().unwrap_or_else(|| {
                    panic!("track {} ended without a format", binding.id)
                })
            })
            .collect();
        self.sample_formats = Some(formats);
    }

    fn seek_map(&mut self, seek_map: SeekMap) {
        self.seek_map = Some(seek_map);
    }
}

/// Indirection between one extracted track and the sink of the current
/// chunk.
struct BindingTrackOutput {
    id: u32,
    track_type: TrackType,
    manifest_format: Option<Format>,

    sample_format: Option<Format>,
    sink: Sink,
    end_time_us: Option<i64>,
}

impl BindingTrackOutput {
    fn new(id: u32, track_type: TrackType, manifest_format: Option<Format>) -> Self {
        Self {
            id,
            track_type,
            manifest_format,
            sample_format: None,
            sink: Sink::Discarding,
            end_time_us: None,
        }
    }

    fn bind(&mut self, provider: Option<&dyn TrackOutputProvider>, end_time_us: Option<i64>) {
        let Some(provider) = provider else {
            self.sink = Sink::Discarding;
            return;
        };

        self.end_time_us = end_time_us;
        self.sink = provider.track(self.id, self.track_type);
        if let Some(format) = &self.sample_format {
            self.sink.format(format.clone());
        }
    }
}

impl TrackOutput for BindingTrackOutput {
    fn format(&mut self, format: Format) {
        let format = match &self.manifest_format {
            Some(manifest_format) => format.with_manifest_format_info(manifest_format),
            None => format,
        };
        self.sample_format = Some(format.clone());
        self.sink.format(format);
    }

    fn sample_data(
        &mut self,
        input: &mut dyn ExtractorInput,
        length: usize,
        allow_end_of_input: bool,
    ) -> EkidenResult<usize> {
        self.sink.sample_data(input, length, allow_end_of_input)
    }

    fn sample_bytes(&mut self, data: &[u8]) {
        self.sink.sample_bytes(data)
    }

    fn sample_metadata(
        &mut self,
        time_us: i64,
        flags: SampleFlags,
        size: usize,
        offset: usize,
        crypto_data: Option<&CryptoData>,
    ) {
        if let Some(end_time_us) = self.end_time_us {
            if time_us >= end_time_us && !self.sink.is_discarding() {
                tracing::debug!(
                    track = self.id,
                    time_us,
                    end_time_us,
                    "Sample reached the chunk end, discarding the rest of the chunk"
                );
                self.sink = Sink::Discarding;
            }
        }
        self.sink
            .sample_metadata(time_us, flags, size, offset, crypto_data);
    }
}
