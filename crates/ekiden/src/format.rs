use std::sync::Arc;

pub mod mime_types {
    pub const VIDEO_MP4: &str = "video/mp4";
    pub const VIDEO_H264: &str = "video/avc";
    pub const VIDEO_H265: &str = "video/hevc";
    pub const AUDIO_MP4: &str = "audio/mp4";
    pub const AUDIO_OGG: &str = "audio/ogg";
    pub const AUDIO_OPUS: &str = "audio/opus";
    pub const AUDIO_VORBIS: &str = "audio/vorbis";
    pub const AUDIO_FLAC: &str = "audio/flac";
    pub const APPLICATION_OGG: &str = "application/ogg";
    pub const APPLICATION_MP4: &str = "application/mp4";
    pub const APPLICATION_CEA608: &str = "application/cea-608";
    pub const APPLICATION_CEA708: &str = "application/cea-708";
    pub const APPLICATION_SCTE35: &str = "application/x-scte35";
    pub const APPLICATION_ID3: &str = "application/id3";
    pub const VIDEO_MP2T: &str = "video/mp2t";
    pub const TEXT_VTT: &str = "text/vtt";
    pub const IMAGE_JPEG: &str = "image/jpeg";
    pub const IMAGE_PNG: &str = "image/png";

    pub fn top_level_type(mime_type: &str) -> &str {
        mime_type
            .split_once('/')
            .map(|(top_level, _)| top_level)
            .unwrap_or(mime_type)
    }

    pub fn is_text(mime_type: Option<&str>) -> bool {
        matches!(mime_type, Some(mime) if top_level_type(mime) == "text")
    }

    pub fn is_image(mime_type: Option<&str>) -> bool {
        matches!(mime_type, Some(mime) if top_level_type(mime) == "image")
    }

    pub fn is_ogg(mime_type: Option<&str>) -> bool {
        matches!(mime_type, Some(AUDIO_OGG | APPLICATION_OGG | AUDIO_OPUS))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum TrackType {
    #[default]
    Unknown,
    Default,
    Audio,
    Video,
    Text,
    Image,
    Metadata,
    CameraMotion,
    None,
}

impl TrackType {
    pub fn from_mime_type(mime_type: Option<&str>) -> Self {
        let Some(mime_type) = mime_type else {
            return Self::Unknown;
        };

        match mime_type {
            mime_types::APPLICATION_CEA608 | mime_types::APPLICATION_CEA708 => Self::Text,
            mime_types::APPLICATION_ID3 | mime_types::APPLICATION_SCTE35 => Self::Metadata,
            _ => match mime_types::top_level_type(mime_type) {
                "video" => Self::Video,
                "audio" => Self::Audio,
                "text" => Self::Text,
                "image" => Self::Image,
                _ => Self::Unknown,
            },
        }
    }
}

/// Selection flag: the track is the default choice.
pub const SELECTION_FLAG_DEFAULT: u32 = 1;
/// Selection flag: the track must be selected even when not preferred.
pub const SELECTION_FLAG_FORCED: u32 = 1 << 1;
/// Selection flag: the track was auto-selected.
pub const SELECTION_FLAG_AUTOSELECT: u32 = 1 << 2;

/// Subsample timestamps are relative to their sample.
pub const OFFSET_SAMPLE_RELATIVE: i64 = i64::MAX;

/// Immutable description of a track's media.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Format {
    pub id: Option<String>,
    pub label: Option<String>,
    pub language: Option<String>,
    pub selection_flags: u32,
    pub role_flags: u32,
    pub average_bitrate: Option<u32>,
    pub peak_bitrate: Option<u32>,
    pub codecs: Option<String>,
    pub container_mime_type: Option<String>,
    pub sample_mime_type: Option<String>,
    pub initialization_data: Vec<Arc<Vec<u8>>>,
    pub drm_scheme: Option<u128>,
    pub subsample_offset_us: i64,
    pub channel_count: Option<u32>,
    pub sample_rate: Option<u32>,
    pub accessibility_channel: Option<u32>,
}

impl Default for Format {
    fn default() -> Self {
        Self {
            id: None,
            label: None,
            language: None,
            selection_flags: 0,
            role_flags: 0,
            average_bitrate: None,
            peak_bitrate: None,
            codecs: None,
            container_mime_type: None,
            sample_mime_type: None,
            initialization_data: Vec::new(),
            drm_scheme: None,
            subsample_offset_us: OFFSET_SAMPLE_RELATIVE,
            channel_count: None,
            sample_rate: None,
            accessibility_channel: None,
        }
    }
}

impl Format {
    pub fn builder() -> FormatBuilder {
        FormatBuilder::default()
    }

    pub fn build_upon(&self) -> FormatBuilder {
        FormatBuilder {
            format: self.clone(),
        }
    }

    pub fn track_type(&self) -> TrackType {
        TrackType::from_mime_type(
            self.sample_mime_type
                .as_deref()
                .or(self.container_mime_type.as_deref()),
        )
    }

    /// Merges the fields declared by a manifest into this extracted format.
    ///
    /// Manifest values take precedence where both are present. Fields the
    /// manifest leaves unset keep the extracted value.
    pub fn with_manifest_format_info(&self, manifest: &Format) -> Format {
        if self == manifest {
            return self.clone();
        }

        let track_type = self.track_type();
        let mut merged = self.clone();

        merged.id = manifest.id.clone().or_else(|| self.id.clone());
        merged.label = manifest.label.clone().or_else(|| self.label.clone());
        // "und" in a manifest only fills a gap, it never overrides.
        merged.language = match manifest.language.as_deref() {
            Some("und") => self.language.clone().or_else(|| manifest.language.clone()),
            Some(language) => Some(language.to_string()),
            None => self.language.clone(),
        };
        merged.average_bitrate = manifest.average_bitrate.or(self.average_bitrate);
        merged.peak_bitrate = manifest.peak_bitrate.or(self.peak_bitrate);

        // Only an unambiguous codec of this track's type is taken over.
        if let Some(codecs) = codecs_of_type(manifest.codecs.as_deref(), track_type) {
            if !codecs.contains(',') {
                merged.codecs = Some(codecs);
            }
        }

        merged.selection_flags = self.selection_flags | manifest.selection_flags;
        merged.role_flags = self.role_flags | manifest.role_flags;
        merged.drm_scheme = manifest.drm_scheme.or(self.drm_scheme);
        merged.accessibility_channel = manifest
            .accessibility_channel
            .or(self.accessibility_channel);

        merged
    }
}

fn codecs_of_type(codecs: Option<&str>, track_type: TrackType) -> Option<String> {
    let codecs = codecs?;
    let matching: Vec<&str> = codecs
        .split(',')
        .map(str::trim)
        .filter(|codec| codec_track_type(codec) == track_type)
        .collect();
    if matching.is_empty() {
        None
    } else {
        Some(matching.join(","))
    }
}

fn codec_track_type(codec: &str) -> TrackType {
    let prefix = codec.split('.').next().unwrap_or(codec);
    match prefix {
        "avc1" | "avc3" | "hev1" | "hvc1" | "vp08" | "vp09" | "av01" | "dvh1" | "dvhe" => {
            TrackType::Video
        }
        "mp4a" | "ac-3" | "ec-3" | "opus" | "vorbis" | "flac" | "fLaC" | "Opus" => {
            TrackType::Audio
        }
        "stpp" | "wvtt" | "cea608" | "cea708" => TrackType::Text,
        _ => TrackType::Unknown,
    }
}

#[derive(Debug, Clone, Default)]
pub struct FormatBuilder {
    format: Format,
}

impl FormatBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.format.id = Some(id.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.format.label = Some(label.into());
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.format.language = Some(language.into());
        self
    }

    pub fn selection_flags(mut self, selection_flags: u32) -> Self {
        self.format.selection_flags = selection_flags;
        self
    }

    pub fn role_flags(mut self, role_flags: u32) -> Self {
        self.format.role_flags = role_flags;
        self
    }

    pub fn average_bitrate(mut self, bitrate: u32) -> Self {
        self.format.average_bitrate = Some(bitrate);
        self
    }

    pub fn peak_bitrate(mut self, bitrate: u32) -> Self {
        self.format.peak_bitrate = Some(bitrate);
        self
    }

    pub fn codecs(mut self, codecs: impl Into<String>) -> Self {
        self.format.codecs = Some(codecs.into());
        self
    }

    pub fn container_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.format.container_mime_type = Some(mime_type.into());
        self
    }

    pub fn sample_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.format.sample_mime_type = Some(mime_type.into());
        self
    }

    pub fn initialization_data(mut self, data: Vec<Arc<Vec<u8>>>) -> Self {
        self.format.initialization_data = data;
        self
    }

    pub fn drm_scheme(mut self, scheme: u128) -> Self {
        self.format.drm_scheme = Some(scheme);
        self
    }

    pub fn subsample_offset_us(mut self, offset_us: i64) -> Self {
        self.format.subsample_offset_us = offset_us;
        self
    }

    pub fn channel_count(mut self, channel_count: u32) -> Self {
        self.format.channel_count = Some(channel_count);
        self
    }

    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.format.sample_rate = Some(sample_rate);
        self
    }

    pub fn accessibility_channel(mut self, channel: Option<u32>) -> Self {
        self.format.accessibility_channel = channel;
        self
    }

    pub fn build(self) -> Format {
        self.format
    }
}
