use super::{
    Extractor, ExtractorInput, ExtractorOutput, OggExtractor, ReadResult, SingleSampleExtractor,
};
use crate::{
    error::{EkidenError, EkidenResult},
    format::mime_types,
};

/// The extractors built into this crate.
#[derive(Debug)]
pub enum BundledExtractor {
    Png(SingleSampleExtractor),
    Jpeg(SingleSampleExtractor),
    Ogg(OggExtractor),
}

impl BundledExtractor {
    pub fn png() -> Self {
        Self::Png(SingleSampleExtractor::png())
    }

    pub fn jpeg() -> Self {
        Self::Jpeg(SingleSampleExtractor::jpeg())
    }

    pub fn ogg() -> Self {
        Self::Ogg(OggExtractor::new())
    }

    /// Picks the extractor for a declared container MIME type.
    pub fn for_container_mime_type(mime_type: &str) -> Option<Self> {
        match mime_type {
            mime_types::IMAGE_PNG => Some(Self::png()),
            mime_types::IMAGE_JPEG => Some(Self::jpeg()),
            _ if mime_types::is_ogg(Some(mime_type)) => Some(Self::ogg()),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BundledExtractor::Png(_) => "png",
            BundledExtractor::Jpeg(_) => "jpeg",
            BundledExtractor::Ogg(_) => "ogg",
        }
    }

    pub fn container_mime_type(&self) -> &'static str {
        match self {
            BundledExtractor::Png(extractor) | BundledExtractor::Jpeg(extractor) => {
                extractor.container_mime_type()
            }
            BundledExtractor::Ogg(_) => mime_types::AUDIO_OGG,
        }
    }
}

impl Extractor for BundledExtractor {
    fn sniff(&mut self, input: &mut dyn ExtractorInput) -> EkidenResult<bool> {
        match self {
            BundledExtractor::Png(extractor) => extractor.sniff(input),
            BundledExtractor::Jpeg(extractor) => extractor.sniff(input),
            BundledExtractor::Ogg(extractor) => extractor.sniff(input),
        }
    }

    fn init(&mut self, output: &mut dyn ExtractorOutput) {
        match self {
            BundledExtractor::Png(extractor) => extractor.init(output),
            BundledExtractor::Jpeg(extractor) => extractor.init(output),
            BundledExtractor::Ogg(extractor) => extractor.init(output),
        }
    }

    fn read(
        &mut self,
        input: &mut dyn ExtractorInput,
        output: &mut dyn ExtractorOutput,
    ) -> EkidenResult<ReadResult> {
        match self {
            BundledExtractor::Png(extractor) => extractor.read(input, output),
            BundledExtractor::Jpeg(extractor) => extractor.read(input, output),
            BundledExtractor::Ogg(extractor) => extractor.read(input, output),
        }
    }

    fn seek(&mut self, position: u64, time_us: i64) {
        match self {
            BundledExtractor::Png(extractor) => extractor.seek(position, time_us),
            BundledExtractor::Jpeg(extractor) => extractor.seek(position, time_us),
            BundledExtractor::Ogg(extractor) => extractor.seek(position, time_us),
        }
    }

    fn release(&mut self) {
        match self {
            BundledExtractor::Png(extractor) => extractor.release(),
            BundledExtractor::Jpeg(extractor) => extractor.release(),
            BundledExtractor::Ogg(extractor) => extractor.release(),
        }
    }
}

/// Probes PNG, JPEG and Ogg in that order and returns the first match.
///
/// Nothing is consumed from `input`.
pub fn sniff_extractor(input: &mut dyn ExtractorInput) -> EkidenResult<BundledExtractor> {
    let candidates = [
        BundledExtractor::png(),
        BundledExtractor::jpeg(),
        BundledExtractor::ogg(),
    ];

    for mut extractor in candidates {
        if extractor.sniff(input)? {
            tracing::debug!("Sniffed {} container", extractor.name());
            return Ok(extractor);
        }
    }

    Err(EkidenError::UnrecognizedContainer(
        "none of the bundled extractors matched the input".to_string(),
    ))
}
