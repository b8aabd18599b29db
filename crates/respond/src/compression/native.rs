use crate::compression::{CompressionLevel, CompressionMethod, CompressionMethods, CompressionResult, Compressor, CompressorFactory};
use crate::protocol::CompressionError;
use bytes::{Buf, Bytes, BytesMut};
use flate2::Compression;
use flate2::write::{GzEncoder, ZlibEncoder};
use std::fmt;
use std::io;
use std::io::Write;
use tracing::trace;
use zstd::stream::write::Encoder as ZstdEncoder;

/// zstd's recommended stream input size (`ZSTD_CStreamInSize`)
const ZSTD_BLOCK_SIZE: usize = 128 * 1024;

const BROTLI_BUFFER_SIZE: usize = 32 * 1024;
const BROTLI_LGWIN: u32 = 22;

/// An `io::Write` sink collecting the encoder output.
struct Writer {
    buf: BytesMut,
}

impl Writer {
    fn new() -> Self {
        Self { buf: BytesMut::with_capacity(4096) }
    }

    fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

enum Encoder {
    Gzip(GzEncoder<Writer>),
    Deflate(ZlibEncoder<Writer>),
    Zstd(ZstdEncoder<'static, Writer>),
    Br(Box<brotli::CompressorWriter<Writer>>),
}

impl Encoder {
    fn new(method: CompressionMethod, level: CompressionLevel) -> io::Result<Self> {
        let encoder = match method {
            CompressionMethod::Gzip => Self::Gzip(GzEncoder::new(Writer::new(), flate2_level(level))),
            CompressionMethod::Deflate => Self::Deflate(ZlibEncoder::new(Writer::new(), flate2_level(level))),
            CompressionMethod::Zstd => Self::Zstd(ZstdEncoder::new(Writer::new(), zstd_level(level))?),
            CompressionMethod::Brotli => Self::Br(Box::new(brotli::CompressorWriter::new(
                Writer::new(),
                BROTLI_BUFFER_SIZE,
                brotli_quality(level),
                BROTLI_LGWIN,
            ))),
        };
        Ok(encoder)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Self::Gzip(encoder) => encoder.write_all(data),
            Self::Deflate(encoder) => encoder.write_all(data),
            Self::Zstd(encoder) => encoder.write_all(data),
            Self::Br(encoder) => encoder.write_all(data),
        }
    }

    fn take(&mut self) -> Bytes {
        match self {
            Self::Gzip(encoder) => encoder.get_mut().take(),
            Self::Deflate(encoder) => encoder.get_mut().take(),
            Self::Zstd(encoder) => encoder.get_mut().take(),
            Self::Br(encoder) => encoder.get_mut().take(),
        }
    }

    fn finish(self) -> io::Result<Bytes> {
        let writer = match self {
            Self::Gzip(encoder) => encoder.finish()?,
            Self::Deflate(encoder) => encoder.finish()?,
            Self::Zstd(encoder) => encoder.finish()?,
            // into_inner closes the brotli stream
            Self::Br(encoder) => encoder.into_inner(),
        };
        Ok(writer.buf.freeze())
    }
}

fn flate2_level(level: CompressionLevel) -> Compression {
    match level {
        CompressionLevel::Fastest => Compression::fast(),
        CompressionLevel::Optimal | CompressionLevel::SmallestSize => Compression::best(),
        CompressionLevel::NoCompression => Compression::none(),
    }
}

fn zstd_level(level: CompressionLevel) -> i32 {
    match level {
        CompressionLevel::Fastest | CompressionLevel::NoCompression => 1,
        CompressionLevel::Optimal => 6,
        CompressionLevel::SmallestSize => *zstd::compression_level_range().end(),
    }
}

fn brotli_quality(level: CompressionLevel) -> u32 {
    match level {
        CompressionLevel::Fastest => 1,
        CompressionLevel::Optimal => 11,
        CompressionLevel::SmallestSize => 9,
        CompressionLevel::NoCompression => 5,
    }
}

/// A [`Compressor`] over the flate2, brotli and zstd stream encoders.
///
/// The encoders write into an owned buffer, output that does not fit the caller's
/// window is kept pending and handed out before any further input is accepted.
pub struct NativeCompressor {
    method: CompressionMethod,
    encoder: Option<Encoder>,
    pending: Bytes,
}

impl NativeCompressor {
    /// # Errors
    ///
    /// Returns the io error raised by the codec while initializing.
    pub fn new(method: CompressionMethod, level: CompressionLevel) -> Result<Self, CompressionError> {
        let encoder = Encoder::new(method, level)?;
        Ok(Self { method, encoder: Some(encoder), pending: Bytes::new() })
    }

    fn drain_pending(&mut self, output: &mut [u8]) -> usize {
        let written = self.pending.len().min(output.len());
        output[..written].copy_from_slice(&self.pending[..written]);
        self.pending.advance(written);
        written
    }
}

impl Compressor for NativeCompressor {
    fn method(&self) -> CompressionMethod {
        self.method
    }

    fn block_size(&self) -> usize {
        match self.method {
            CompressionMethod::Zstd => ZSTD_BLOCK_SIZE,
            _ => 0,
        }
    }

    fn compress_block(&mut self, input: &[u8], output: &mut [u8]) -> Result<CompressionResult, CompressionError> {
        let encoder = self.encoder.as_mut().ok_or(CompressionError::Finished)?;

        let mut read = 0;
        if self.pending.is_empty() && !input.is_empty() {
            encoder.write(input)?;
            self.pending = encoder.take();
            read = input.len();
        }

        let written = self.drain_pending(output);
        Ok(CompressionResult { read, written })
    }

    fn flush(&mut self, output: &mut [u8]) -> Result<usize, CompressionError> {
        if self.pending.is_empty() {
            if let Some(encoder) = self.encoder.take() {
                self.pending = encoder.finish()?;
                trace!(method = %self.method, size = self.pending.len(), "compressor finished");
            }
        }
        Ok(self.drain_pending(output))
    }
}

impl fmt::Debug for NativeCompressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeCompressor")
            .field("method", &self.method)
            .field("finished", &self.encoder.is_none())
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Creates [`NativeCompressor`]s for every [`CompressionMethod`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeCompressorFactory;

impl CompressorFactory for NativeCompressorFactory {
    fn supported(&self) -> CompressionMethods {
        CompressionMethods::all()
    }

    fn create(&self, method: CompressionMethod, level: CompressionLevel) -> Result<Box<dyn Compressor>, CompressionError> {
        Ok(Box::new(NativeCompressor::new(method, level)?))
    }
}
