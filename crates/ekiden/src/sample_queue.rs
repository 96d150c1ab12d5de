use std::collections::VecDeque;

use bytes::Bytes;

use crate::{
    error::{EkidenError, EkidenResult},
    extractor::{CryptoData, ExtractorInput, SampleFlags, TrackOutput},
    format::{Format, OFFSET_SAMPLE_RELATIVE},
};

/// A committed sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub time_us: i64,
    pub flags: SampleFlags,
    pub data: Bytes,
    pub crypto_data: Option<CryptoData>,
}

/// Queue of the samples of one track, written by extractors and read by a
/// renderer.
///
/// The write index counts every sample ever committed, so it keeps growing
/// after samples are read out.
#[derive(Debug, Default)]
pub struct SampleQueue {
    unadjusted_upstream_format: Option<Format>,
    upstream_format: Option<Format>,
    sample_offset_us: i64,

    pending: Vec<u8>,
    samples: VecDeque<Sample>,
    /// Absolute index of the first sample in `samples`.
    absolute_first_index: usize,
    largest_queued_timestamp_us: Option<i64>,
}

impl SampleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last format written, adjusted by the sample offset.
    pub fn upstream_format(&self) -> Option<&Format> {
        self.upstream_format.as_ref()
    }

    /// Offset added to the timestamp of every sample committed from now on.
    pub fn set_sample_offset_us(&mut self, sample_offset_us: i64) {
        if self.sample_offset_us == sample_offset_us {
            return;
        }
        self.sample_offset_us = sample_offset_us;
        self.upstream_format = self
            .unadjusted_upstream_format
            .as_ref()
            .map(|format| self.adjusted_format(format));
    }

    pub fn sample_offset_us(&self) -> i64 {
        self.sample_offset_us
    }

    /// Absolute index of the next sample to be committed.
    pub fn write_index(&self) -> usize {
        self.absolute_first_index + self.samples.len()
    }

    /// Absolute index of the next sample to be read.
    pub fn read_index(&self) -> usize {
        self.absolute_first_index
    }

    pub fn largest_queued_timestamp_us(&self) -> Option<i64> {
        self.largest_queued_timestamp_us
    }

    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Reads the next sample out of the queue.
    pub fn read(&mut self) -> Option<Sample> {
        let sample = self.samples.pop_front()?;
        self.absolute_first_index += 1;
        Some(sample)
    }

    /// Drops queued samples and pending bytes. Indices keep counting.
    pub fn reset(&mut self) {
        self.absolute_first_index += self.samples.len();
        self.samples.clear();
        self.pending.clear();
        self.largest_queued_timestamp_us = None;
    }

    fn adjusted_format(&self, format: &Format) -> Format {
        if self.sample_offset_us == 0 || format.subsample_offset_us == OFFSET_SAMPLE_RELATIVE {
            return format.clone();
        }
        format
            .build_upon()
            .subsample_offset_us(format.subsample_offset_us.saturating_add(self.sample_offset_us))
            .build()
    }
}

impl TrackOutput for SampleQueue {
    fn format(&mut self, format: Format) {
        self.upstream_format = Some(self.adjusted_format(&format));
        self.unadjusted_upstream_format = Some(format);
    }

    fn sample_data(
        &mut self,
        input: &mut dyn ExtractorInput,
        length: usize,
        allow_end_of_input: bool,
    ) -> EkidenResult<usize> {
        let start = self.pending.len();
        self.pending.resize(start + length, 0);
        let read = input.read(&mut self.pending[start..]);
        let read = match read {
            Ok(read) => read,
            Err(e) => {
                self.pending.truncate(start);
                return Err(e);
            }
        };
        self.pending.truncate(start + read);

        if read == 0 && length > 0 && !allow_end_of_input {
            return Err(EkidenError::EndOfInput);
        }
        Ok(read)
    }

    fn sample_bytes(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    fn sample_metadata(
        &mut self,
        time_us: i64,
        flags: SampleFlags,
        size: usize,
        offset: usize,
        crypto_data: Option<&CryptoData>,
    ) {
        assert!(
            size + offset <= self.pending.len(),
            "sample of {size} bytes at offset {offset} exceeds {} pending bytes",
            self.pending.len()
        );

        let end = self.pending.len() - offset;
        let data = Bytes::copy_from_slice(&self.pending[end - size..end]);
        self.pending.drain(..end);

        let time_us = time_us.saturating_add(self.sample_offset_us);
        self.largest_queued_timestamp_us = Some(
            self.largest_queued_timestamp_us
                .map_or(time_us, |largest| largest.max(time_us)),
        );
        self.samples.push_back(Sample {
            time_us,
            flags,
            data,
            crypto_data: crypto_data.cloned(),
        });
    }
}
