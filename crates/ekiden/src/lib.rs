//! Chunk-based media extraction.
//!
//! ```text
//! ┌──────────────┐  bytes   ┌──────────────────┐  samples  ┌─────────────────────┐
//! │  DataSource  ├──────────►     Extractor    ├───────────►    TrackOutput      │
//! └──────────────┘          └────────┬─────────┘           └──────────┬──────────┘
//!                                    │ seek map                       │ bind
//!                           ┌────────▼─────────┐           ┌──────────▼──────────┐
//!                           │  Initialization/ │           │     SampleQueue     │
//!                           │   media chunks   │           │     (per track)     │
//!                           └────────┬─────────┘           └─────────────────────┘
//!                                    │ spawn_blocking
//!                           ┌────────▼─────────┐
//!                           │      Loader      │
//!                           │   [SEMAPHORE]    │
//!                           └──────────────────┘
//! ```

pub mod chunk;
pub mod drm;
pub mod error;
pub mod extractor;
pub mod format;
pub mod loader;
pub mod loudness;
pub mod reorder;
pub mod sample_queue;
pub mod ts;
pub mod upstream;

pub use chunk::{BundledChunkExtractor, ChunkExtractorFactory, SharedChunkExtractor};
pub use error::{EkidenError, EkidenResult};
pub use extractor::{Extractor, ExtractorInput, ExtractorOutput, TrackOutput};
pub use format::{Format, TrackType};
pub use loader::{Loadable, Loader};
pub use upstream::{DataSource, DataSpec};
