//! Byte sources that chunks are loaded from.

mod file;
mod http;
mod memory;

pub use file::FileDataSource;
pub use http::HttpDataSource;
pub use memory::MemoryDataSource;

use crate::error::EkidenResult;

/// A byte range request, optionally open-ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataSpec {
    pub position: u64,
    pub length: Option<u64>,
    /// Cache key of the resource, if any.
    pub key: Option<String>,
}

impl DataSpec {
    pub fn new(position: u64, length: Option<u64>) -> Self {
        Self {
            position,
            length,
            key: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Returns the part of this range that starts `offset` bytes in.
    pub fn subrange(&self, offset: u64) -> Self {
        Self {
            position: self.position + offset,
            length: self.length.map(|length| length.saturating_sub(offset)),
            key: self.key.clone(),
        }
    }

    /// Whether the range covers no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.length == Some(0)
    }

    /// Value of the `Range` header for this spec. An empty range has none.
    pub fn to_http_range(&self) -> Option<String> {
        match self.length {
            Some(0) => None,
            Some(length) => Some(format!(
                "bytes={}-{}",
                self.position,
                self.position + length - 1
            )),
            None => Some(format!("bytes={}-", self.position)),
        }
    }
}

/// A readable byte source.
///
/// Reads block until data is available. Implementations are driven by one
/// load at a time and need not be `Sync`.
pub trait DataSource: Send {
    /// Opens the source for reading the given range.
    ///
    /// Returns the number of bytes that can be read, if known.
    fn open(&mut self, spec: &DataSpec) -> EkidenResult<Option<u64>>;

    /// Reads up to `buf.len()` bytes. Returns `0` at the end of the range.
    fn read(&mut self, buf: &mut [u8]) -> EkidenResult<usize>;

    /// Releases the underlying resource. Closing twice is allowed.
    fn close(&mut self);
}

impl<D> DataSource for Box<D>
where
    D: DataSource + ?Sized,
{
    fn open(&mut self, spec: &DataSpec) -> EkidenResult<Option<u64>> {
        self.as_mut().open(spec)
    }

    fn read(&mut self, buf: &mut [u8]) -> EkidenResult<usize> {
        self.as_mut().read(buf)
    }

    fn close(&mut self) {
        self.as_mut().close()
    }
}
