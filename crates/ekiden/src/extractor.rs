//! Container extractors and the interfaces they read from and write to.
//!
//! An extractor goes through `sniff` → `init` → `read`* and may be released
//! at any point. `seek` drops its buffered state and resumes parsing at the
//! given position.

mod bundled;
mod input;
pub mod ogg;
mod output;
mod single_sample;

pub use bundled::{sniff_extractor, BundledExtractor};
pub use input::{DefaultExtractorInput, ExtractorInput, MAX_PEEK_BYTES};
pub use ogg::OggExtractor;
pub use output::{
    ChunkIndex, CryptoData, CryptoMode, DiscardingTrackOutput, ExtractorOutput, SampleFlags,
    SeekMap, TrackOutput,
};
pub use single_sample::{SingleSampleExtractor, IMAGE_TRACK_ID};

use crate::error::EkidenResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadResult {
    Continue,
    EndOfInput,
    /// The caller must reopen the input at the given position and read again.
    Seek(u64),
}

pub trait Extractor {
    /// Probes whether the input is in this extractor's format.
    ///
    /// Only peeks. The peek position is reset before returning, whether or
    /// not the input matched, so another extractor can probe the same bytes.
    fn sniff(&mut self, input: &mut dyn ExtractorInput) -> EkidenResult<bool>;

    /// Called once before the first [`read`](Self::read).
    fn init(&mut self, output: &mut dyn ExtractorOutput);

    fn read(
        &mut self,
        input: &mut dyn ExtractorInput,
        output: &mut dyn ExtractorOutput,
    ) -> EkidenResult<ReadResult>;

    /// Drops buffered state. Parsing resumes at byte `position` of the
    /// stream, which corresponds to `time_us`.
    fn seek(&mut self, position: u64, time_us: i64);

    fn release(&mut self) {}
}

impl<E> Extractor for Box<E>
where
    E: Extractor + ?Sized,
{
    fn sniff(&mut self, input: &mut dyn ExtractorInput) -> EkidenResult<bool> {
        self.as_mut().sniff(input)
    }

    fn init(&mut self, output: &mut dyn ExtractorOutput) {
        self.as_mut().init(output)
    }

    fn read(
        &mut self,
        input: &mut dyn ExtractorInput,
        output: &mut dyn ExtractorOutput,
    ) -> EkidenResult<ReadResult> {
        self.as_mut().read(input, output)
    }

    fn seek(&mut self, position: u64, time_us: i64) {
        self.as_mut().seek(position, time_us)
    }

    fn release(&mut self) {
        self.as_mut().release()
    }
}
