//! Wire framing for HTTP responses
//!
//! This module turns response heads and body bytes into the exact octets sent on the
//! transport. Both framers work in place on buffers owned by the connection, so the
//! steady state of a keep-alive connection performs no allocation per request.
//!
//! # Components
//!
//! - [`HeaderAccumulator`]: serializes the status line, headers and cookies
//!   through a charset aware [`HeaderWriter`]
//! - [`ChunkAccumulator`]: frames body bytes into `<hex-size>\r\n<data>\r\n` chunks,
//!   backfilling the size into a reserved prefix once the chunk is complete
//!
//! # Features
//!
//! - Chunked transfer encoding (RFC 7230 section 4.1)
//! - Bounds checked header serialization with configurable charset
//! - No intermediate allocation for size prefixes or header text

mod chunk_accumulator;
mod header_accumulator;

pub use chunk_accumulator::{ChunkAccumulator, LAST_CHUNK, MAX_SIZE_TEXT, MIN_CHUNK_BUFFER_SIZE, RESERVED_SIZE, encode_chunk_size, reserved_offset};
pub use header_accumulator::{HeaderAccumulator, HeaderCharset, HeaderWriter};
