use crate::compression::Compressor;
use crate::protocol::{CompressionError, ResponseBody, SendError};
use crate::utils::ensure;
use crate::writer::{BodySink, BufferedSink};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

/// Writes one response entity, borrowing the connection copy buffer for stream sources.
#[derive(Debug)]
pub struct EntityWriter<'b> {
    copy_buffer: &'b mut [u8],
}

impl<'b> EntityWriter<'b> {
    pub fn new(copy_buffer: &'b mut [u8]) -> Self {
        Self { copy_buffer }
    }

    /// Writes the body to `sink` uncompressed, at most `limit` bytes when set.
    ///
    /// Memory bodies are handed to the sink straight from their backing bytes, stream and
    /// direct bodies are read through the copy buffer until end of stream or until the
    /// limit is reached. The body source is closed once written.
    ///
    /// Returns the number of entity bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Io`] when reading the source or writing the sink fails, a sink
    /// that accepts nothing is reported as `WriteZero`.
    pub async fn write<S: BodySink>(
        &mut self,
        body: &mut ResponseBody,
        sink: &mut S,
        limit: Option<u64>,
    ) -> Result<u64, SendError> {
        let written = match body {
            ResponseBody::Empty => 0,
            ResponseBody::Memory(reader) => {
                let mut written = 0u64;
                loop {
                    let memory = reader.memory();
                    let size = budget(limit, written, memory.len());
                    if size == 0 {
                        break;
                    }

                    let accepted = sink.write(&memory[..size]).await?;
                    ensure!(accepted > 0, SendError::io(io::ErrorKind::WriteZero));
                    reader.advance(accepted);
                    written += accepted as u64;
                }
                written
            }
            ResponseBody::Stream { reader, .. } => self.copy_stream(reader, sink, limit).await?,
            ResponseBody::Direct { handle, .. } => self.copy_stream(handle, sink, limit).await?,
        };

        body.close();
        Ok(written)
    }

    async fn copy_stream<R, S>(&mut self, reader: &mut R, sink: &mut S, limit: Option<u64>) -> Result<u64, SendError>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
        S: BodySink,
    {
        let mut written = 0u64;
        loop {
            let size = budget(limit, written, self.copy_buffer.len());
            if size == 0 {
                break;
            }

            let read = reader.read(&mut self.copy_buffer[..size]).await?;
            if read == 0 {
                break;
            }

            write_all(sink, &self.copy_buffer[..read]).await?;
            written += read as u64;
        }
        Ok(written)
    }

    /// Writes the body through `compressor` into `sink`, then drains the compressor and
    /// terminates the body.
    ///
    /// Input windows are trimmed to the compressor block size when it has one. The sink is
    /// flushed whenever its memory is full. Once the source is exhausted the compressor
    /// is flushed until it produces nothing more, and only then the sink gets its final
    /// flush.
    ///
    /// Returns the number of uncompressed entity bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Compression`] when the codec fails or makes no progress right
    /// after a sink flush, and
    /// [`SendError::InvalidBody`] when a stream ends before its declared length. In both
    /// cases the body is left unterminated.
    pub async fn write_compressed<S: BufferedSink>(
        &mut self,
        body: &mut ResponseBody,
        compressor: &mut dyn Compressor,
        sink: &mut S,
    ) -> Result<u64, SendError> {
        let declared = body.length();
        // output committed to the sink since its last flush
        let mut pending = false;
        let consumed = match body {
            ResponseBody::Empty => 0,
            ResponseBody::Memory(reader) => {
                let memory = reader.memory();
                let size = memory.len();
                compress_input(compressor, sink, memory, &mut pending).await?;
                reader.advance(size);
                size as u64
            }
            ResponseBody::Stream { reader, .. } => self.compress_stream(reader, compressor, sink, &mut pending).await?,
            ResponseBody::Direct { handle, .. } => self.compress_stream(handle, compressor, sink, &mut pending).await?,
        };
        body.close();

        if let Some(declared) = declared {
            ensure!(
                consumed == declared,
                SendError::invalid_body(format!("body produced {consumed} bytes, {declared} declared"))
            );
        }

        // a codec may hold output back until it has enough room, so an empty flush
        // only ends the drain once the sink memory has been handed over whole
        loop {
            let written = compressor.flush(sink.memory())?;
            if written == 0 {
                if !pending {
                    break;
                }
                sink.flush(false).await?;
                pending = false;
                continue;
            }
            pending = true;
            if sink.advance(written) == 0 {
                sink.flush(false).await?;
                pending = false;
            }
        }
        trace!(consumed, method = %compressor.method(), "compressed entity drained");
        sink.flush(true).await?;
        Ok(consumed)
    }

    async fn compress_stream<R, S>(
        &mut self,
        reader: &mut R,
        compressor: &mut dyn Compressor,
        sink: &mut S,
        pending: &mut bool,
    ) -> Result<u64, SendError>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
        S: BufferedSink,
    {
        let mut consumed = 0u64;
        loop {
            let read = reader.read(&mut self.copy_buffer[..]).await?;
            if read == 0 {
                break;
            }
            compress_input(compressor, sink, &self.copy_buffer[..read], pending).await?;
            consumed += read as u64;
        }
        Ok(consumed)
    }
}

/// Bytes allowed for the next write given what has been written against `limit`.
fn budget(limit: Option<u64>, written: u64, available: usize) -> usize {
    match limit {
        Some(limit) => {
            let left = limit.saturating_sub(written);
            usize::try_from(left).map_or(available, |left| left.min(available))
        }
        None => available,
    }
}

async fn write_all<S: BodySink>(sink: &mut S, mut data: &[u8]) -> Result<(), SendError> {
    while !data.is_empty() {
        let accepted = sink.write(data).await?;
        ensure!(accepted > 0, SendError::io(io::ErrorKind::WriteZero));
        data = &data[accepted..];
    }
    Ok(())
}

async fn compress_input<S: BufferedSink>(
    compressor: &mut dyn Compressor,
    sink: &mut S,
    mut input: &[u8],
    pending: &mut bool,
) -> Result<(), SendError> {
    let block_size = compressor.block_size();
    while !input.is_empty() {
        let window = if block_size > 0 { &input[..block_size.min(input.len())] } else { input };

        let result = compressor.compress_block(window, sink.memory())?;
        if result.read == 0 && result.written == 0 {
            // only a codec that had the whole sink memory has stalled
            ensure!(*pending, CompressionError::Stalled.into());
            sink.flush(false).await?;
            *pending = false;
            continue;
        }

        input = &input[result.read..];
        if result.written > 0 {
            *pending = true;
        }
        if sink.advance(result.written) == 0 {
            sink.flush(false).await?;
            *pending = false;
        }
    }
    Ok(())
}
