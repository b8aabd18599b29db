//! Response body sources.
//!
//! A response carries at most one body source, modelled as [`ResponseBody`]. Memory
//! bodies are written straight from their backing [`Bytes`] without an intermediate
//! copy, stream and direct bodies are pumped through the connection copy buffer.

use bytes::Bytes;
use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// A boxed reader used by stream bodies
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// A forward only, single pass reader over an in memory body.
#[derive(Debug, Clone, Default)]
pub struct MemoryReader {
    data: Bytes,
    position: usize,
}

impl MemoryReader {
    pub fn new(data: Bytes) -> Self {
        Self { data, position: 0 }
    }

    /// The unread part of the body
    #[inline]
    pub fn memory(&self) -> &[u8] {
        &self.data[self.position..]
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// Marks `count` bytes as consumed.
    ///
    /// # Panics
    ///
    /// Panics if `count` is larger than [`remaining`](Self::remaining).
    #[inline]
    pub fn advance(&mut self, count: usize) {
        assert!(count <= self.remaining(), "advance {count} past the end of the memory body");
        self.position += count;
    }

    /// Releases the backing memory
    pub fn close(&mut self) {
        self.data = Bytes::new();
        self.position = 0;
    }
}

/// The body source of one response.
#[derive(Default)]
pub enum ResponseBody {
    /// no entity at all
    #[default]
    Empty,
    /// an in memory entity
    Memory(MemoryReader),
    /// a managed stream whose length is known up front
    Stream { reader: BoxedReader, length: u64 },
    /// a caller provided read handle, such as a file, with an optional known length
    Direct { handle: BoxedReader, length: Option<u64> },
}

impl ResponseBody {
    pub fn memory<B: Into<Bytes>>(data: B) -> Self {
        let data = data.into();
        if data.is_empty() { ResponseBody::Empty } else { ResponseBody::Memory(MemoryReader::new(data)) }
    }

    pub fn stream<R>(reader: R, length: u64) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        ResponseBody::Stream { reader: Box::new(reader), length }
    }

    pub fn direct<R>(handle: R, length: Option<u64>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        ResponseBody::Direct { handle: Box::new(handle), length }
    }

    /// Opens a file body, its length is read from the file metadata.
    ///
    /// # Errors
    ///
    /// Returns the io error raised while reading the metadata.
    pub async fn file(file: tokio::fs::File) -> io::Result<Self> {
        let length = file.metadata().await?.len();
        Ok(Self::direct(file, Some(length)))
    }

    /// Returns true if a body source is set
    #[inline]
    pub fn has_data(&self) -> bool {
        !matches!(self, ResponseBody::Empty)
    }

    /// The entity length, `None` when it is only known once the source is exhausted
    pub fn length(&self) -> Option<u64> {
        match self {
            ResponseBody::Empty => Some(0),
            ResponseBody::Memory(reader) => Some(reader.remaining() as u64),
            ResponseBody::Stream { length, .. } => Some(*length),
            ResponseBody::Direct { length, .. } => *length,
        }
    }

    /// Discards the first `count` bytes of the source.
    ///
    /// # Errors
    ///
    /// Returns an `UnexpectedEof` io error when the source holds fewer bytes.
    pub async fn skip(&mut self, count: u64) -> io::Result<()> {
        if count == 0 {
            return Ok(());
        }

        let skipped = match self {
            ResponseBody::Empty => 0,
            ResponseBody::Memory(reader) => {
                let skip = usize::try_from(count).map_or(reader.remaining(), |count| count.min(reader.remaining()));
                reader.advance(skip);
                skip as u64
            }
            ResponseBody::Stream { reader, length } => {
                let skipped = tokio::io::copy(&mut reader.take(count), &mut tokio::io::sink()).await?;
                *length = length.saturating_sub(skipped);
                skipped
            }
            ResponseBody::Direct { handle, length } => {
                let skipped = tokio::io::copy(&mut handle.take(count), &mut tokio::io::sink()).await?;
                *length = length.map(|length| length.saturating_sub(skipped));
                skipped
            }
        };

        if skipped < count {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "body is shorter than the skipped range"));
        }
        Ok(())
    }

    /// Drops the source, releasing its resources.
    pub fn close(&mut self) {
        if let ResponseBody::Memory(reader) = self {
            reader.close();
        }
        *self = ResponseBody::Empty;
    }
}

impl From<Bytes> for ResponseBody {
    fn from(value: Bytes) -> Self {
        Self::memory(value)
    }
}

impl From<String> for ResponseBody {
    fn from(value: String) -> Self {
        Self::memory(value)
    }
}

impl From<&'static str> for ResponseBody {
    fn from(value: &'static str) -> Self {
        Self::memory(value)
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(value: Vec<u8>) -> Self {
        Self::memory(value)
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Empty => f.write_str("Empty"),
            ResponseBody::Memory(reader) => f.debug_tuple("Memory").field(&reader.remaining()).finish(),
            ResponseBody::Stream { length, .. } => f.debug_struct("Stream").field("length", length).finish(),
            ResponseBody::Direct { length, .. } => f.debug_struct("Direct").field("length", length).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn memory_reader_advances() {
        let mut reader = MemoryReader::new(Bytes::from_static(b"hello"));
        assert_eq!(reader.memory(), b"hello");
        reader.advance(2);
        assert_eq!(reader.memory(), b"llo");
        assert_eq!(reader.remaining(), 3);
        reader.advance(3);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    #[should_panic(expected = "past the end")]
    fn memory_reader_rejects_over_advance() {
        let mut reader = MemoryReader::new(Bytes::from_static(b"hi"));
        reader.advance(3);
    }

    #[test]
    fn empty_memory_is_no_body() {
        assert!(!ResponseBody::memory("").has_data());
        assert_eq!(ResponseBody::default().length(), Some(0));
    }

    #[test]
    fn lengths() {
        assert_eq!(ResponseBody::from("hello").length(), Some(5));
        assert_eq!(ResponseBody::stream(Cursor::new(vec![0u8; 10]), 10).length(), Some(10));
        assert_eq!(ResponseBody::direct(Cursor::new(vec![0u8; 10]), None).length(), None);
    }

    #[tokio::test]
    async fn skip_memory_and_stream() {
        let mut body = ResponseBody::from("hello world");
        body.skip(6).await.unwrap();
        assert_eq!(body.length(), Some(5));

        let mut body = ResponseBody::stream(Cursor::new(b"hello world".to_vec()), 11);
        body.skip(6).await.unwrap();
        assert_eq!(body.length(), Some(5));
        let ResponseBody::Stream { reader, .. } = &mut body else { panic!("expected stream body") };
        let mut rest = String::new();
        reader.read_to_string(&mut rest).await.unwrap();
        assert_eq!(rest, "world");
    }

    #[tokio::test]
    async fn skip_past_end_fails() {
        let mut body = ResponseBody::direct(Cursor::new(b"abc".to_vec()), None);
        let error = body.skip(4).await.unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn close_clears_source() {
        let mut body = ResponseBody::from("hello");
        body.close();
        assert!(!body.has_data());
    }
}
