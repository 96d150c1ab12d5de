//! Payload readers for elementary streams carried in transport streams.

pub mod cea;
mod passthrough;
mod sei;
mod timestamp;

pub use passthrough::PassthroughSectionReader;
pub use sei::SeiReader;
pub use timestamp::TimestampAdjuster;

use memchr::memmem;

/// Hands out track ids to the payload readers of one program.
#[derive(Debug, Clone)]
pub struct TrackIdGenerator {
    format_id_prefix: String,
    first_track_id: u32,
    track_id_increment: u32,
    track_id: Option<u32>,
}

impl TrackIdGenerator {
    pub fn new(first_track_id: u32, track_id_increment: u32) -> Self {
        Self {
            format_id_prefix: String::new(),
            first_track_id,
            track_id_increment,
            track_id: None,
        }
    }

    /// Format ids will read `"{program_number}/{track_id}"`.
    pub fn with_program_number(mut self, program_number: u32) -> Self {
        self.format_id_prefix = format!("{program_number}/");
        self
    }

    pub fn generate_new_id(&mut self) {
        self.track_id = Some(match self.track_id {
            Some(track_id) => track_id + self.track_id_increment,
            None => self.first_track_id,
        });
    }

    /// # Panics
    ///
    /// If no id was generated yet.
    pub fn track_id(&self) -> u32 {
        self.track_id
            .expect("generate_new_id must be called before track_id")
    }

    pub fn format_id(&self) -> String {
        format!("{}{}", self.format_id_prefix, self.track_id())
    }
}

/// Removes emulation prevention bytes (the `03` of `00 00 03`) from a NAL
/// unit payload.
pub fn unescape_rbsp(data: &[u8]) -> Vec<u8> {
    let mut unescaped = Vec::with_capacity(data.len());
    let mut rest = data;
    while let Some(pos) = memmem::find(rest, b"\x00\x00\x03") {
        unescaped.extend_from_slice(&rest[..pos + 2]);
        rest = &rest[pos + 3..];
    }
    unescaped.extend_from_slice(rest);
    unescaped
}
