//! Body sinks and the entity write loop.
//!
//! A response body is written against one of two sink shapes:
//!
//! - [`BodySink`]: accepts a slice and reports how much of it was taken, the direct
//!   writer and the chunked writer both implement it
//! - [`BufferedSink`]: exposes its own writable memory so a compressor can produce output
//!   in place, only the chunked writer implements it
//!
//! [`EntityWriter`] drives memory, stream and direct body sources through those sinks,
//! with or without a compressor.

mod entity_writer;

pub use entity_writer::EntityWriter;

use crate::protocol::SendError;

#[trait_variant::make(BodySink: Send)]
pub trait LocalBodySink {
    /// Writes a prefix of `buf`, returning the number of bytes accepted.
    async fn write(&mut self, buf: &[u8]) -> Result<usize, SendError>;
}

#[trait_variant::make(BufferedSink: Send)]
pub trait LocalBufferedSink {
    /// The writable memory following the bytes committed so far
    fn memory(&mut self) -> &mut [u8];

    /// Commits `count` bytes written into [`memory`](Self::memory), returns the capacity left.
    fn advance(&mut self, count: usize) -> usize;

    /// Sends what has been committed, `is_final` terminates the body.
    async fn flush(&mut self, is_final: bool) -> Result<(), SendError>;
}
