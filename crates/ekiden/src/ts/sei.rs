use bytes::Bytes;

use super::{cea, unescape_rbsp, TrackIdGenerator};
use crate::{
    extractor::ExtractorOutput,
    format::{mime_types, Format, TrackType},
    reorder::ReorderingQueue,
};

/// Emits the closed captions found in SEI messages, reordered from decode
/// order into presentation order.
#[derive(Debug)]
pub struct SeiReader {
    closed_caption_formats: Vec<Format>,
    container_mime_type: String,
    track_ids: Vec<u32>,
    reordering_queue: ReorderingQueue<Bytes>,
}

impl SeiReader {
    pub fn new(closed_caption_formats: Vec<Format>, container_mime_type: impl Into<String>) -> Self {
        Self {
            closed_caption_formats,
            container_mime_type: container_mime_type.into(),
            track_ids: Vec::new(),
            reordering_queue: ReorderingQueue::new(),
        }
    }

    /// Creates one text track per closed caption format.
    ///
    /// # Panics
    ///
    /// If a format is neither CEA-608 nor CEA-708.
    pub fn create_tracks(
        &mut self,
        output: &mut dyn ExtractorOutput,
        id_generator: &mut TrackIdGenerator,
    ) {
        self.track_ids.clear();
        for channel_format in &self.closed_caption_formats {
            id_generator.generate_new_id();
            let track_id = id_generator.track_id();

            let channel_mime_type = channel_format.sample_mime_type.as_deref();
            assert!(
                matches!(
                    channel_mime_type,
                    Some(mime_types::APPLICATION_CEA608 | mime_types::APPLICATION_CEA708)
                ),
                "Invalid closed caption MIME type provided: {channel_mime_type:?}"
            );

            let format_id = channel_format
                .id
                .clone()
                .unwrap_or_else(|| id_generator.format_id());
            let mut format = Format::builder()
                .id(format_id)
                .container_mime_type(self.container_mime_type.clone())
                .selection_flags(channel_format.selection_flags)
                .accessibility_channel(channel_format.accessibility_channel)
                .initialization_data(channel_format.initialization_data.clone());
            if let Some(mime_type) = channel_mime_type {
                format = format.sample_mime_type(mime_type);
            }
            if let Some(language) = &channel_format.language {
                format = format.language(language.clone());
            }

            output.track(track_id, TrackType::Text).format(format.build());
            self.track_ids.push(track_id);
        }
    }

    pub fn track_ids(&self) -> &[u32] {
        &self.track_ids
    }

    /// Number of SEI buffers held back to restore presentation order.
    ///
    /// Shrinking the queue releases the oldest buffers to the outputs.
    pub fn set_reordering_queue_size(
        &mut self,
        reordering_queue_size: Option<usize>,
        output: &mut dyn ExtractorOutput,
    ) {
        let track_ids = &self.track_ids;
        self.reordering_queue
            .set_max_size(reordering_queue_size, |time_us, buffer| {
                cea::consume(Some(time_us), &buffer, output, track_ids)
            });
    }

    /// Queues an unescaped SEI message buffer without the NAL unit header.
    pub fn consume(
        &mut self,
        pes_time_us: i64,
        sei_buffer: Bytes,
        output: &mut dyn ExtractorOutput,
    ) {
        let track_ids = &self.track_ids;
        self.reordering_queue
            .add(pes_time_us, sei_buffer, |time_us, buffer| {
                cea::consume(Some(time_us), &buffer, output, track_ids)
            });
    }

    /// Queues the SEI messages of a raw NAL unit whose header is
    /// `header_length` bytes long (1 for H.264, 2 for H.265).
    pub fn consume_nal_unit(
        &mut self,
        pes_time_us: i64,
        nal_unit: &[u8],
        header_length: usize,
        output: &mut dyn ExtractorOutput,
    ) {
        let Some(payload) = nal_unit.get(header_length..) else {
            return;
        };
        self.consume(pes_time_us, Bytes::from(unescape_rbsp(payload)), output);
    }

    /// Releases every held back buffer to the outputs.
    pub fn flush(&mut self, output: &mut dyn ExtractorOutput) {
        let track_ids = &self.track_ids;
        self.reordering_queue.flush(|time_us, buffer| {
            cea::consume(Some(time_us), &buffer, output, track_ids)
        });
    }

    /// Drops every held back buffer.
    pub fn clear(&mut self) {
        self.reordering_queue.clear();
    }
}
