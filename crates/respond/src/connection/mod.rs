//! Per connection resources and the connection level driver.
//!
//! # Components
//!
//! - [`ConnectionBuffers`]: the header, chunk and copy buffers a connection takes from the
//!   [`MemoryPool`](crate::pool::MemoryPool) when accepted and returns when released
//! - [`ConnectionStreams`]: the transport binding, handing out the [`DirectWriter`] and
//!   [`ChunkedWriter`] reused by every request
//! - [`ResponseConnection`]: sequences the responses of a keep-alive connection, with a
//!   send deadline and a cancellation scope per request
//!
//! Nothing here is shared between connections except the pool and the compressor factory.

mod buffers;
mod http_connection;
mod streams;

pub use buffers::ConnectionBuffers;
pub use http_connection::ResponseConnection;
pub use streams::ChunkedWriter;
pub use streams::ConnectionStreams;
pub use streams::DirectWriter;
