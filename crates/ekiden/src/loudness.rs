//! Loudness management for audio decoders.
//!
//! Platforms without loudness support get [`LoudnessCapability::Unsupported`]
//! and every operation becomes a no-op. Platform errors never reach the
//! caller: a failing codec simply stays unmanaged.

use std::collections::HashSet;

use crate::error::EkidenResult;

/// Identifies an audio decoder instance.
pub type CodecId = u64;

/// Platform loudness controller bound to one audio session at a time.
pub trait LoudnessPlatform: Send {
    fn open(&mut self, audio_session_id: i32) -> EkidenResult<()>;

    /// Returns whether the codec is now under loudness management.
    fn add_codec(&mut self, codec: CodecId) -> EkidenResult<bool>;

    fn remove_codec(&mut self, codec: CodecId) -> EkidenResult<()>;

    fn close(&mut self) -> EkidenResult<()>;
}

pub enum LoudnessCapability {
    Unsupported,
    Available(Box<dyn LoudnessPlatform>),
}

impl LoudnessCapability {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

impl std::fmt::Debug for LoudnessCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsupported => f.write_str("Unsupported"),
            Self::Available(_) => f.write_str("Available"),
        }
    }
}

#[derive(Debug)]
pub struct LoudnessController {
    capability: LoudnessCapability,
    codecs: HashSet<CodecId>,
    session_open: bool,
}

impl LoudnessController {
    pub fn new(capability: LoudnessCapability) -> Self {
        Self {
            capability,
            codecs: HashSet::new(),
            session_open: false,
        }
    }

    pub fn unsupported() -> Self {
        Self::new(LoudnessCapability::Unsupported)
    }

    pub fn codecs(&self) -> &HashSet<CodecId> {
        &self.codecs
    }

    /// Moves loudness management to a new audio session.
    ///
    /// Registered codecs are re-added to the new session. Those the platform
    /// rejects are forgotten.
    pub fn set_audio_session_id(&mut self, audio_session_id: i32) {
        let LoudnessCapability::Available(platform) = &mut self.capability else {
            return;
        };

        if self.session_open {
            if let Err(e) = platform.close() {
                tracing::debug!("Failed to close loudness session: {e}");
            }
            self.session_open = false;
        }

        if let Err(e) = platform.open(audio_session_id) {
            tracing::debug!("Loudness unavailable for session {audio_session_id}: {e}");
            return;
        }
        self.session_open = true;

        self.codecs
            .retain(|&codec| matches!(platform.add_codec(codec), Ok(true)));
    }

    /// Registers a codec. Returns whether it was added.
    ///
    /// Before a session is open the codec is only remembered.
    ///
    /// # Panics
    ///
    /// If the codec is already registered.
    pub fn add_codec(&mut self, codec: CodecId) -> bool {
        let added = match &mut self.capability {
            LoudnessCapability::Available(platform) if self.session_open => {
                match platform.add_codec(codec) {
                    Ok(added) => added,
                    Err(e) => {
                        tracing::debug!("Failed to add codec {codec}: {e}");
                        false
                    }
                }
            }
            _ => true,
        };

        if added {
            assert!(self.codecs.insert(codec), "codec {codec} already registered");
        }
        added
    }

    pub fn remove_codec(&mut self, codec: CodecId) {
        if !self.codecs.remove(&codec) || !self.session_open {
            return;
        }
        if let LoudnessCapability::Available(platform) = &mut self.capability {
            if let Err(e) = platform.remove_codec(codec) {
                tracing::debug!("Failed to remove codec {codec}: {e}");
            }
        }
    }

    pub fn release(&mut self) {
        self.codecs.clear();
        if !self.session_open {
            return;
        }
        self.session_open = false;
        if let LoudnessCapability::Available(platform) = &mut self.capability {
            if let Err(e) = platform.close() {
                tracing::debug!("Failed to close loudness session: {e}");
            }
        }
    }
}
