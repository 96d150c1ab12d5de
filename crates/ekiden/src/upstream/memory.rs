use bytes::Bytes;

use super::{DataSource, DataSpec};
use crate::error::{EkidenError, EkidenResult};

pub struct MemoryDataSource {
    data: Bytes,
    /// Read position and end of the currently opened range.
    opened: Option<(usize, usize)>,
}

impl MemoryDataSource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            opened: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.opened.is_some()
    }
}

impl DataSource for MemoryDataSource {
    fn open(&mut self, spec: &DataSpec) -> EkidenResult<Option<u64>> {
        let start = spec.position as usize;
        if start > self.data.len() {
            return Err(EkidenError::IOError(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("position {start} is beyond {} bytes", self.data.len()),
            )));
        }

        let end = match spec.length {
            Some(length) => (start + length as usize).min(self.data.len()),
            None => self.data.len(),
        };
        self.opened = Some((start, end));
        Ok(Some((end - start) as u64))
    }

    fn read(&mut self, buf: &mut [u8]) -> EkidenResult<usize> {
        let Some((position, end)) = self.opened.as_mut() else {
            return Ok(0);
        };

        let count = buf.len().min(*end - *position);
        buf[..count].copy_from_slice(&self.data[*position..*position + count]);
        *position += count;
        Ok(count)
    }

    fn close(&mut self) {
        self.opened = None;
    }
}
