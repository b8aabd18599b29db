//! HTTP header accumulator serializing the response head into a connection owned buffer.
//!
//! Character data (status line, header names, cookie text) is formatted through a
//! [`HeaderWriter`] and encoded into bytes on the fly with the configured
//! [`HeaderCharset`], so no intermediate `String` is built per response. Header values
//! are already octets and are copied as is.
//!
//! Unlike chunks, the header block is written from offset zero: its total size
//! never has to be known in advance.

use crate::codec::chunk_accumulator::CRLF;
use crate::pool::PooledBuffer;
use crate::protocol::SendError;
use serde::Deserialize;
use std::fmt;

/// Character set used to encode header text into bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum HeaderCharset {
    #[default]
    #[serde(rename = "utf-8")]
    Utf8,
    /// ISO-8859-1, characters outside of it are replaced with `?`
    #[serde(rename = "latin1")]
    Latin1,
}

impl HeaderCharset {
    /// Encodes `text` into `out`, returning the number of bytes written or `None` if
    /// `out` is too small.
    fn encode(self, text: &str, out: &mut [u8]) -> Option<usize> {
        match self {
            HeaderCharset::Utf8 => {
                let bytes = text.as_bytes();
                let dst = out.get_mut(..bytes.len())?;
                dst.copy_from_slice(bytes);
                Some(bytes.len())
            }
            HeaderCharset::Latin1 => {
                let mut written = 0;
                for c in text.chars() {
                    let slot = out.get_mut(written)?;
                    *slot = u8::try_from(u32::from(c)).unwrap_or(b'?');
                    written += 1;
                }
                Some(written)
            }
        }
    }
}

/// Accumulates the header block of a response, reused by every request of a connection.
#[derive(Debug)]
pub struct HeaderAccumulator {
    buffer: PooledBuffer,
    accumulated: usize,
    charset: HeaderCharset,
}

impl HeaderAccumulator {
    pub fn new(buffer: PooledBuffer, charset: HeaderCharset) -> Self {
        Self { buffer, accumulated: 0, charset }
    }

    #[inline]
    pub fn accumulated(&self) -> usize {
        self.accumulated
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity() - self.accumulated
    }

    /// Returns a forward only character writer appending to the accumulated data.
    ///
    /// A write that does not fit returns [`fmt::Error`] and leaves the cursor where the
    /// last complete token ended.
    pub fn writer(&mut self) -> HeaderWriter<'_> {
        HeaderWriter { accumulator: self }
    }

    /// Encodes a single character token at the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::HeaderOverflow`] if the token does not fit the buffer.
    pub fn write_token(&mut self, token: &str) -> Result<(), SendError> {
        let written = self
            .charset
            .encode(token, &mut self.buffer[self.accumulated..])
            .ok_or_else(|| SendError::header_overflow(self.buffer.capacity()))?;
        self.accumulated += written;
        Ok(())
    }

    /// Copies raw octets at the cursor, used for header values.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::HeaderOverflow`] if the bytes do not fit the buffer.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), SendError> {
        let capacity = self.capacity();
        let end = self.accumulated + bytes.len();
        let dst = self.buffer.get_mut(self.accumulated..end).ok_or_else(|| SendError::header_overflow(capacity))?;
        dst.copy_from_slice(bytes);
        self.accumulated = end;
        Ok(())
    }

    /// Appends the CRLF terminating a header line or the header block.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::HeaderOverflow`] if the CRLF does not fit the buffer.
    #[inline]
    pub fn write_termination(&mut self) -> Result<(), SendError> {
        self.write_bytes(CRLF)
    }

    /// The header block accumulated so far
    #[inline]
    pub fn response_data(&self) -> &[u8] {
        &self.buffer[..self.accumulated]
    }

    #[inline]
    pub fn reset(&mut self) {
        self.accumulated = 0;
    }

    pub fn into_buffer(self) -> PooledBuffer {
        self.buffer
    }
}

/// Character writer over a [`HeaderAccumulator`].
pub struct HeaderWriter<'a> {
    accumulator: &'a mut HeaderAccumulator,
}

impl HeaderWriter<'_> {
    /// Writes a header name, title cased when `title_case` is set
    /// (`content-type` becomes `Content-Type`).
    pub fn write_header_name(&mut self, name: &str, title_case: bool) -> fmt::Result {
        if !title_case {
            return fmt::Write::write_str(self, name);
        }

        let mut upper = true;
        for c in name.chars() {
            let c = if upper { c.to_ascii_uppercase() } else { c };
            upper = c == '-';
            fmt::Write::write_char(self, c)?;
        }
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> fmt::Result {
        self.accumulator.write_bytes(bytes).map_err(|_overflow| fmt::Error)
    }
}

impl fmt::Write for HeaderWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.accumulator.write_token(s).map_err(|_overflow| fmt::Error)
    }
}

impl fmt::Debug for HeaderWriter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderWriter").field("accumulated", &self.accumulator.accumulated).finish()
    }
}
