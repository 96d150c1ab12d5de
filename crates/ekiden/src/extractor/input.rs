use crate::{
    error::{EkidenError, EkidenResult},
    upstream::DataSource,
};

/// Upper bound of bytes that can be peeked ahead of the read position.
pub const MAX_PEEK_BYTES: usize = 64 * 1024;

const SCRATCH_SPACE_SIZE: usize = 4096;

/// Sequential reader over the bytes of one chunk, with non-consuming look-ahead.
///
/// `read` style methods consume bytes and move [`position`](Self::position).
/// `peek` style methods look ahead from [`peek_position`](Self::peek_position)
/// without consuming. Consuming any byte resets the peek position to the read
/// position.
pub trait ExtractorInput {
    /// Reads up to `buf.len()` bytes. Returns `0` at the end of input.
    fn read(&mut self, buf: &mut [u8]) -> EkidenResult<usize>;

    /// Fills `buf` completely.
    ///
    /// Returns `false` if the input ended before any byte was read and
    /// `allow_end_of_input` is set. Ending part way through is an error.
    /// A call that fails leaves the position where it was.
    fn read_fully(&mut self, buf: &mut [u8], allow_end_of_input: bool) -> EkidenResult<bool>;

    /// Skips up to `length` bytes. Returns `0` at the end of input.
    fn skip(&mut self, length: usize) -> EkidenResult<usize>;

    /// Skips exactly `length` bytes, with the end of input rules of
    /// [`read_fully`](Self::read_fully).
    fn skip_fully(&mut self, length: usize, allow_end_of_input: bool) -> EkidenResult<bool>;

    /// Copies the next `buf.len()` bytes after the peek position into `buf`
    /// and advances the peek position.
    fn peek_fully(&mut self, buf: &mut [u8], allow_end_of_input: bool) -> EkidenResult<bool>;

    fn advance_peek_position(
        &mut self,
        length: usize,
        allow_end_of_input: bool,
    ) -> EkidenResult<bool>;

    /// Moves the peek position back to the read position.
    fn reset_peek_position(&mut self);

    fn position(&self) -> u64;

    fn peek_position(&self) -> u64;

    /// Total length of the input, if known.
    fn length(&self) -> Option<u64>;
}

/// [`ExtractorInput`] reading from an opened [`DataSource`].
pub struct DefaultExtractorInput<'a, S>
where
    S: DataSource + ?Sized,
{
    source: &'a mut S,
    position: u64,
    length: Option<u64>,

    /// Bytes fetched from the source ahead of `position`.
    peek_buffer: Vec<u8>,
    peek_buffer_position: usize,
}

impl<'a, S> DefaultExtractorInput<'a, S>
where
    S: DataSource + ?Sized,
{
    /// `position` is the absolute offset the source was opened at, `length`
    /// the absolute length of the stream if known.
    pub fn new(source: &'a mut S, position: u64, length: Option<u64>) -> Self {
        Self {
            source,
            position,
            length,
            peek_buffer: Vec::new(),
            peek_buffer_position: 0,
        }
    }

    fn read_from_peek_buffer(&mut self, buf: &mut [u8]) -> usize {
        let count = buf.len().min(self.peek_buffer.len());
        if count == 0 {
            return 0;
        }

        buf[..count].copy_from_slice(&self.peek_buffer[..count]);
        self.consume_peek_buffer(count);
        count
    }

    fn skip_from_peek_buffer(&mut self, length: usize) -> usize {
        let count = length.min(self.peek_buffer.len());
        if count > 0 {
            self.consume_peek_buffer(count);
        }
        count
    }

    fn consume_peek_buffer(&mut self, count: usize) {
        self.peek_buffer.drain(..count);
        self.peek_buffer_position = self.peek_buffer_position.saturating_sub(count);
    }

    /// Returns `0` only at the end of input.
    fn read_from_source(&mut self, buf: &mut [u8]) -> EkidenResult<usize> {
        self.source.read(buf)
    }

    /// Reads from the source until the peek buffer holds `target` bytes.
    ///
    /// Returns `false` if the input ended with the buffer still at `start`
    /// bytes and `allow_end_of_input` is set. Fetched bytes stay buffered when
    /// this fails, so nothing is lost for a later call.
    fn fill_peek_buffer(
        &mut self,
        target: usize,
        start: usize,
        allow_end_of_input: bool,
    ) -> EkidenResult<bool> {
        let mut scratch = [0u8; SCRATCH_SPACE_SIZE];
        while self.peek_buffer.len() < target {
            let limit = (target - self.peek_buffer.len()).min(SCRATCH_SPACE_SIZE);
            let read = self.read_from_source(&mut scratch[..limit])?;
            if read == 0 {
                if allow_end_of_input && self.peek_buffer.len() == start {
                    return Ok(false);
                }
                return Err(EkidenError::EndOfInput);
            }
            self.peek_buffer.extend_from_slice(&scratch[..read]);
        }
        Ok(true)
    }
}

impl<S> ExtractorInput for DefaultExtractorInput<'_, S>
where
    S: DataSource + ?Sized,
{
    fn read(&mut self, buf: &mut [u8]) -> EkidenResult<usize> {
        let mut read = self.read_from_peek_buffer(buf);
        if read == 0 && !buf.is_empty() {
            read = self.read_from_source(buf)?;
        }
        self.position += read as u64;
        Ok(read)
    }

    fn read_fully(&mut self, buf: &mut [u8], allow_end_of_input: bool) -> EkidenResult<bool> {
        if !self.fill_peek_buffer(buf.len(), 0, allow_end_of_input)? {
            return Ok(false);
        }
        let read = self.read_from_peek_buffer(buf);
        self.position += read as u64;
        Ok(true)
    }

    fn skip(&mut self, length: usize) -> EkidenResult<usize> {
        let mut skipped = self.skip_from_peek_buffer(length);
        if skipped == 0 && length > 0 {
            let mut scratch = [0u8; SCRATCH_SPACE_SIZE];
            let limit = length.min(SCRATCH_SPACE_SIZE);
            skipped = self.read_from_source(&mut scratch[..limit])?;
        }
        self.position += skipped as u64;
        Ok(skipped)
    }

    fn skip_fully(&mut self, length: usize, allow_end_of_input: bool) -> EkidenResult<bool> {
        if !self.fill_peek_buffer(length, 0, allow_end_of_input)? {
            return Ok(false);
        }
        let skipped = self.skip_from_peek_buffer(length);
        self.position += skipped as u64;
        Ok(true)
    }

    fn peek_fully(&mut self, buf: &mut [u8], allow_end_of_input: bool) -> EkidenResult<bool> {
        if !self.advance_peek_position(buf.len(), allow_end_of_input)? {
            return Ok(false);
        }
        let end = self.peek_buffer_position;
        buf.copy_from_slice(&self.peek_buffer[end - buf.len()..end]);
        Ok(true)
    }

    fn advance_peek_position(
        &mut self,
        length: usize,
        allow_end_of_input: bool,
    ) -> EkidenResult<bool> {
        let target = self.peek_buffer_position + length;
        if target > MAX_PEEK_BYTES {
            return Err(EkidenError::malformed(format!(
                "peek of {target} bytes exceeds the {MAX_PEEK_BYTES} byte window"
            )));
        }

        let start = self.peek_buffer_position;
        if !self.fill_peek_buffer(target, start, allow_end_of_input)? {
            return Ok(false);
        }

        self.peek_buffer_position = target;
        Ok(true)
    }

    fn reset_peek_position(&mut self) {
        self.peek_buffer_position = 0;
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn peek_position(&self) -> u64 {
        self.position + self.peek_buffer_position as u64
    }

    fn length(&self) -> Option<u64> {
        self.length
    }
}
