use bytes::{Buf, Bytes};
use reqwest::{
    header::{HeaderMap, RANGE},
    Client, Response, StatusCode, Url,
};
use tokio::runtime::Handle;

use super::{DataSource, DataSpec};
use crate::error::{EkidenError, EkidenResult};

/// Reads a byte range of a remote resource.
///
/// Requests run on the given runtime and are awaited with
/// [`Handle::block_on`], so the source must be driven from a blocking thread
/// (for example a task started by [`crate::loader::Loader`]).
pub struct HttpDataSource {
    client: Client,
    url: Url,
    headers: Option<HeaderMap>,
    handle: Handle,

    response: Option<Response>,
    pending: Bytes,
    /// Bytes left in the requested range when the server sent more.
    bytes_remaining: Option<u64>,
}

impl HttpDataSource {
    pub fn new(handle: Handle, client: Client, url: Url) -> Self {
        Self {
            client,
            url,
            headers: None,
            handle,
            response: None,
            pending: Bytes::new(),
            bytes_remaining: None,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Discards the first `count` bytes of the open response.
    fn skip_bytes(&mut self, mut count: u64) -> EkidenResult<()> {
        let Some(response) = self.response.as_mut() else {
            return Ok(());
        };
        while count > 0 {
            let Some(mut chunk) = self.handle.block_on(response.chunk())? else {
                return Err(EkidenError::HttpError(StatusCode::RANGE_NOT_SATISFIABLE));
            };
            let skipped = count.min(chunk.len() as u64);
            chunk.advance(skipped as usize);
            count -= skipped;
            self.pending = chunk;
        }
        Ok(())
    }
}

impl DataSource for HttpDataSource {
    fn open(&mut self, spec: &DataSpec) -> EkidenResult<Option<u64>> {
        self.close();
        if spec.is_empty() {
            return Ok(Some(0));
        }

        let mut request = self.client.get(self.url.clone());
        if let Some(headers) = &self.headers {
            request = request.headers(headers.clone());
        }
        if spec.position > 0 || spec.length.is_some() {
            if let Some(range) = spec.to_http_range() {
                request = request.header(RANGE, range);
            }
        }

        let response = self.handle.block_on(request.send())?;
        let status = response.status();
        if !status.is_success() {
            if let Ok(body) = self.handle.block_on(response.text()) {
                tracing::warn!("Error body: {body}");
            }
            return Err(EkidenError::HttpError(status));
        }

        let length = response.content_length();
        self.response = Some(response);
        if status == StatusCode::PARTIAL_CONTENT {
            return Ok(length);
        }

        // The server ignored the range and sent the whole resource.
        if spec.position > 0 {
            tracing::debug!(
                "Range ignored by server, skipping {} bytes of {}",
                spec.position,
                self.url
            );
            self.skip_bytes(spec.position)?;
        }
        let available = length.map(|length| length.saturating_sub(spec.position));
        let length = match (available, spec.length) {
            (Some(available), Some(requested)) => Some(available.min(requested)),
            (available, requested) => requested.or(available),
        };
        self.bytes_remaining = spec.length;
        Ok(length)
    }

    fn read(&mut self, buf: &mut [u8]) -> EkidenResult<usize> {
        let limit = match self.bytes_remaining {
            Some(remaining) => buf.len().min(remaining.min(usize::MAX as u64) as usize),
            None => buf.len(),
        };
        if limit == 0 {
            return Ok(0);
        }

        while self.pending.is_empty() {
            let Some(response) = self.response.as_mut() else {
                return Ok(0);
            };
            match self.handle.block_on(response.chunk())? {
                Some(chunk) => self.pending = chunk,
                None => return Ok(0),
            }
        }

        let count = limit.min(self.pending.len());
        buf[..count].copy_from_slice(&self.pending[..count]);
        self.pending.advance(count);
        if let Some(remaining) = self.bytes_remaining.as_mut() {
            *remaining -= count as u64;
        }
        Ok(count)
    }

    fn close(&mut self) {
        self.response = None;
        self.pending = Bytes::new();
        self.bytes_remaining = None;
    }
}
