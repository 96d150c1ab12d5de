use super::{TimestampAdjuster, TrackIdGenerator};
use crate::{
    extractor::{ExtractorOutput, SampleFlags},
    format::{Format, TrackType},
};

/// Outputs every section of a metadata stream (SCTE-35, ID3, ...) as one
/// sample.
#[derive(Debug)]
pub struct PassthroughSectionReader {
    format: Format,
    track_id: Option<u32>,
}

impl PassthroughSectionReader {
    pub fn new(sample_mime_type: &str, container_mime_type: &str) -> Self {
        Self {
            format: Format::builder()
                .container_mime_type(container_mime_type)
                .sample_mime_type(sample_mime_type)
                .build(),
            track_id: None,
        }
    }

    pub fn init(&mut self, output: &mut dyn ExtractorOutput, id_generator: &mut TrackIdGenerator) {
        id_generator.generate_new_id();
        let track_id = id_generator.track_id();
        // Emitted before the timestamp offset is known so preparation does
        // not wait on sparse metadata.
        output
            .track(track_id, TrackType::Metadata)
            .format(self.format.clone());
        self.track_id = Some(track_id);
    }

    /// # Panics
    ///
    /// If called before [`init`](Self::init).
    pub fn consume(
        &mut self,
        section: &[u8],
        timestamp_adjuster: &TimestampAdjuster,
        output: &mut dyn ExtractorOutput,
    ) {
        let track_id = self
            .track_id
            .expect("PassthroughSectionReader::consume called before init");

        let (Some(sample_time_us), Some(subsample_offset_us)) = (
            timestamp_adjuster.last_adjusted_timestamp_us(),
            timestamp_adjuster.timestamp_offset_us(),
        ) else {
            return;
        };

        let track = output.track(track_id, TrackType::Metadata);
        if subsample_offset_us != self.format.subsample_offset_us {
            self.format = self
                .format
                .build_upon()
                .subsample_offset_us(subsample_offset_us)
                .build();
            track.format(self.format.clone());
        }

        track.sample_bytes(section);
        track.sample_metadata(sample_time_us, SampleFlags::KEY_FRAME, section.len(), 0, None);
    }
}
