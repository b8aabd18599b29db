//! Writers reused by every request of a connection.
//!
//! [`ConnectionStreams`] holds the transport and the chunk framing state. The writers it
//! hands out are short lived borrows, so nothing is allocated per request. The lifecycle
//! has two levels:
//!
//! - per connection: [`bind`](ConnectionStreams::bind) and [`unbind`](ConnectionStreams::unbind)
//!   the transport
//! - per request: [`on_new_request`](ConnectionStreams::on_new_request) and
//!   [`on_complete`](ConnectionStreams::on_complete) reset the chunk cursor

use crate::codec::{ChunkAccumulator, LAST_CHUNK};
use crate::protocol::SendError;
use crate::utils::ensure;
use crate::writer::{BodySink, BufferedSink};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{trace, warn};

#[derive(Debug)]
struct ChunkedState {
    accumulator: ChunkAccumulator,
    accumulated: usize,
    finished: bool,
}

impl ChunkedState {
    fn reset(&mut self) {
        self.accumulated = 0;
        self.finished = false;
    }
}

#[derive(Debug)]
pub struct ConnectionStreams<W> {
    transport: Option<W>,
    chunked: ChunkedState,
}

impl<W> ConnectionStreams<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(accumulator: ChunkAccumulator) -> Self {
        Self { transport: None, chunked: ChunkedState { accumulator, accumulated: 0, finished: false } }
    }

    /// Binds the transport of a newly accepted connection, returning the previous one if
    /// the streams were still bound.
    pub fn bind(&mut self, transport: W) -> Option<W> {
        self.chunked.reset();
        self.transport.replace(transport)
    }

    /// Releases the transport, writers handed out afterwards fail with [`SendError::Unbound`].
    pub fn unbind(&mut self) -> Option<W> {
        self.chunked.reset();
        self.transport.take()
    }

    pub fn is_bound(&self) -> bool {
        self.transport.is_some()
    }

    pub fn on_new_request(&mut self) {
        self.chunked.reset();
    }

    pub fn on_complete(&mut self) {
        if self.chunked.accumulated > 0 {
            warn!(pending = self.chunked.accumulated, "request completed with unflushed chunk data");
        }
        self.chunked.reset();
    }

    /// A writer sending bytes to the transport as they are
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Unbound`] when no transport is bound.
    pub fn direct_writer(&mut self) -> Result<DirectWriter<'_, W>, SendError> {
        let transport = self.transport.as_mut().ok_or(SendError::Unbound)?;
        Ok(DirectWriter { transport })
    }

    /// A writer framing bytes as http chunks
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Unbound`] when no transport is bound.
    pub fn chunked_writer(&mut self) -> Result<ChunkedWriter<'_, W>, SendError> {
        let transport = self.transport.as_mut().ok_or(SendError::Unbound)?;
        Ok(ChunkedWriter { transport, state: &mut self.chunked })
    }

    /// Returns the transport and the chunk accumulator, ending the connection
    pub fn into_parts(self) -> (Option<W>, ChunkAccumulator) {
        (self.transport, self.chunked.accumulator)
    }
}

#[derive(Debug)]
pub struct DirectWriter<'a, W> {
    transport: &'a mut W,
}

impl<W> DirectWriter<'_, W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// # Errors
    ///
    /// Returns the transport io error.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<(), SendError> {
        Ok(self.transport.write_all(data).await?)
    }

    /// # Errors
    ///
    /// Returns the transport io error.
    pub async fn flush(&mut self) -> Result<(), SendError> {
        Ok(self.transport.flush().await?)
    }
}

impl<W> BodySink for DirectWriter<'_, W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, buf: &[u8]) -> Result<usize, SendError> {
        Ok(self.transport.write(buf).await?)
    }
}

/// Frames body bytes into chunks in the connection chunk buffer.
///
/// Bytes are accumulated until the buffer is full or a flush is requested. A non final
/// flush with nothing accumulated writes nothing, since an empty chunk would end the body.
/// A final flush writes the last data chunk followed by `0\r\n\r\n`, or the terminal chunk
/// alone, and happens at most once per request.
#[derive(Debug)]
pub struct ChunkedWriter<'a, W> {
    transport: &'a mut W,
    state: &'a mut ChunkedState,
}

impl<W> ChunkedWriter<'_, W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn is_finished(&self) -> bool {
        self.state.finished
    }

    async fn flush_chunk(&mut self, is_final: bool) -> Result<(), SendError> {
        if self.state.finished {
            if is_final {
                warn!("final chunk has already been written, ignore the flush");
            }
            return Ok(());
        }

        let accumulated = self.state.accumulated;
        if accumulated == 0 && !is_final {
            return Ok(());
        }

        let data: &[u8] =
            if accumulated == 0 { LAST_CHUNK } else { self.state.accumulator.chunk_data(accumulated, is_final) };
        self.transport.write_all(data).await?;
        trace!(size = accumulated, is_final, "chunk flushed");

        self.state.accumulated = 0;
        if is_final {
            self.state.finished = true;
            self.transport.flush().await?;
        }
        Ok(())
    }
}

impl<W> BodySink for ChunkedWriter<'_, W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, buf: &[u8]) -> Result<usize, SendError> {
        ensure!(!self.state.finished, SendError::invalid_body("chunked body has already been terminated"));
        if buf.is_empty() {
            return Ok(0);
        }

        if self.state.accumulated == self.state.accumulator.segment_capacity() {
            self.flush_chunk(false).await?;
        }

        let memory = self.state.accumulator.remaining_segment(self.state.accumulated);
        let size = memory.len().min(buf.len());
        memory[..size].copy_from_slice(&buf[..size]);
        self.state.accumulated += size;
        Ok(size)
    }
}

impl<W> BufferedSink for ChunkedWriter<'_, W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn memory(&mut self) -> &mut [u8] {
        if self.state.finished {
            return &mut [];
        }
        self.state.accumulator.remaining_segment(self.state.accumulated)
    }

    fn advance(&mut self, count: usize) -> usize {
        let capacity = self.state.accumulator.segment_capacity();
        assert!(self.state.accumulated + count <= capacity, "advance {count} past the chunk segment");
        self.state.accumulated += count;
        capacity - self.state.accumulated
    }

    async fn flush(&mut self, is_final: bool) -> Result<(), SendError> {
        self.flush_chunk(is_final).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PooledBuffer;

    fn streams(chunk_buffer_size: usize) -> ConnectionStreams<Vec<u8>> {
        let accumulator = ChunkAccumulator::new(PooledBuffer::try_new(chunk_buffer_size).unwrap());
        let mut streams = ConnectionStreams::new(accumulator);
        assert!(streams.bind(Vec::new()).is_none());
        streams
    }

    fn wire(streams: &mut ConnectionStreams<Vec<u8>>) -> Vec<u8> {
        streams.unbind().unwrap()
    }

    #[tokio::test]
    async fn two_chunks_then_final() {
        let mut streams = streams(64);
        {
            let mut writer = streams.chunked_writer().unwrap();
            assert_eq!(BodySink::write(&mut writer, b"ab").await.unwrap(), 2);
            writer.flush(false).await.unwrap();
            assert_eq!(BodySink::write(&mut writer, b"c").await.unwrap(), 1);
            writer.flush(true).await.unwrap();
        }
        assert_eq!(wire(&mut streams), b"2\r\nab\r\n1\r\nc\r\n0\r\n\r\n");
    }

    #[tokio::test]
    async fn empty_flushes() {
        let mut streams = streams(64);
        {
            let mut writer = streams.chunked_writer().unwrap();
            writer.flush(false).await.unwrap();
            writer.flush(true).await.unwrap();
            writer.flush(true).await.unwrap();
            assert!(writer.is_finished());
        }
        assert_eq!(wire(&mut streams), b"0\r\n\r\n");
    }

    #[tokio::test]
    async fn write_after_final_fails() {
        let mut streams = streams(64);
        let mut writer = streams.chunked_writer().unwrap();
        writer.flush(true).await.unwrap();
        let result = BodySink::write(&mut writer, b"late").await;
        assert!(matches!(result, Err(SendError::InvalidBody { .. })));
        assert!(writer.memory().is_empty());
    }

    #[tokio::test]
    async fn full_segment_is_flushed() {
        let mut streams = streams(crate::codec::MIN_CHUNK_BUFFER_SIZE + 2);
        {
            let mut writer = streams.chunked_writer().unwrap();
            let mut data: &[u8] = b"abcdefg";
            while !data.is_empty() {
                let accepted = BodySink::write(&mut writer, data).await.unwrap();
                data = &data[accepted..];
            }
            writer.flush(true).await.unwrap();
        }
        assert_eq!(wire(&mut streams), b"3\r\nabc\r\n3\r\ndef\r\n1\r\ng\r\n0\r\n\r\n");
    }

    #[tokio::test]
    async fn buffered_sink_reports_remaining() {
        let mut streams = streams(crate::codec::MIN_CHUNK_BUFFER_SIZE + 3);
        let mut writer = streams.chunked_writer().unwrap();
        assert_eq!(writer.memory().len(), 4);
        writer.memory()[..3].copy_from_slice(b"xyz");
        assert_eq!(writer.advance(3), 1);
        writer.memory()[0] = b'!';
        assert_eq!(writer.advance(1), 0);
        writer.flush(false).await.unwrap();
        assert_eq!(writer.memory().len(), 4);
    }

    #[tokio::test]
    async fn per_request_reset() {
        let mut streams = streams(64);
        streams.chunked_writer().unwrap().flush(true).await.unwrap();
        streams.on_complete();
        streams.on_new_request();

        let mut writer = streams.chunked_writer().unwrap();
        assert!(!writer.is_finished());
        BodySink::write(&mut writer, b"next").await.unwrap();
        writer.flush(true).await.unwrap();
        assert_eq!(wire(&mut streams), b"0\r\n\r\n4\r\nnext\r\n0\r\n\r\n");
    }

    #[tokio::test]
    async fn unbound_writers_fail() {
        let mut streams = streams(64);
        streams.unbind();
        assert!(!streams.is_bound());
        assert!(matches!(streams.direct_writer(), Err(SendError::Unbound)));
        assert!(matches!(streams.chunked_writer(), Err(SendError::Unbound)));
    }

    #[tokio::test]
    async fn direct_writer_passes_through() {
        let mut streams = streams(64);
        {
            let mut writer = streams.direct_writer().unwrap();
            writer.write_all(b"Content-Length: 5\r\n\r\n").await.unwrap();
            assert_eq!(BodySink::write(&mut writer, b"hello").await.unwrap(), 5);
            writer.flush().await.unwrap();
        }
        assert_eq!(wire(&mut streams), b"Content-Length: 5\r\n\r\nhello");
    }
}
