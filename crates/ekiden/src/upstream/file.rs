use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::PathBuf,
};

use super::{DataSource, DataSpec};
use crate::error::EkidenResult;

pub struct FileDataSource {
    path: PathBuf,
    file: Option<File>,
    bytes_remaining: u64,
}

impl FileDataSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
            bytes_remaining: 0,
        }
    }
}

impl DataSource for FileDataSource {
    fn open(&mut self, spec: &DataSpec) -> EkidenResult<Option<u64>> {
        let mut file = File::open(&self.path)?;
        let file_length = file.metadata()?.len();
        file.seek(SeekFrom::Start(spec.position))?;

        let available = file_length.saturating_sub(spec.position);
        self.bytes_remaining = spec
            .length
            .map_or(available, |length| length.min(available));
        self.file = Some(file);

        Ok(Some(self.bytes_remaining))
    }

    fn read(&mut self, buf: &mut [u8]) -> EkidenResult<usize> {
        let Some(file) = self.file.as_mut() else {
            return Ok(0);
        };
        if self.bytes_remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let limit = buf.len().min(self.bytes_remaining as usize);
        let read = file.read(&mut buf[..limit])?;
        self.bytes_remaining -= read as u64;
        Ok(read)
    }

    fn close(&mut self) {
        self.file = None;
    }
}
