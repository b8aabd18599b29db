//! The response emission core of an HTTP/1.1 server
//!
//! This crate turns an application response (status, headers, cookies and one body source)
//! into framed bytes on a tokio transport, optionally compressed and chunk encoded, using
//! a few buffers allocated once per connection instead of per request.
//!
//! # Features
//!
//! - `Content-Length`, chunked and close delimited framing
//! - In memory bodies written without a user space copy
//! - Stream and file bodies pumped through a connection owned copy buffer
//! - gzip, deflate, brotli and zstd compression negotiated from `Accept-Encoding`
//! - `Expect: 100-continue`, `HEAD` and byte range responses
//! - Per request send deadline and cancellation
//!
//! # Example
//!
//! ```no_run
//! use http::{Method, Version};
//! use micro_respond::compression::NativeCompressorFactory;
//! use micro_respond::config::ResponseConfig;
//! use micro_respond::connection::ResponseConnection;
//! use micro_respond::pool::RecyclingPool;
//! use micro_respond::protocol::{HttpError, RequestMeta};
//! use std::sync::Arc;
//! use tokio::net::TcpStream;
//!
//! async fn serve(stream: TcpStream) -> Result<(), HttpError> {
//!     let config = Arc::new(ResponseConfig::default());
//!     let pool = Arc::new(RecyclingPool::new(64));
//!     let (_reader, writer) = stream.into_split();
//!
//!     let mut connection =
//!         ResponseConnection::accept(writer, config, pool)?.with_compressors(Arc::new(NativeCompressorFactory));
//!
//!     let meta = RequestMeta::new(Method::GET, Version::HTTP_11).with_accept_encoding("gzip, br");
//!     connection.begin_request(meta).await?;
//!     connection.response_mut().set_body("Hello World!\r\n")?;
//!     connection.send_response().await?;
//!
//!     connection.release();
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`codec`]: chunk and header framers working in place on pooled buffers
//! - [`compression`]: the block oriented compressor contract and its native codecs
//! - [`writer`]: body sinks and the entity write loop
//! - [`response`]: the response state machine and transfer policy
//! - [`connection`]: per connection buffers, writers and the request lifecycle
//! - [`pool`]: the memory pool contract
//! - [`protocol`]: body sources, cookies, ranges, request facts and errors
//! - [`config`]: serde configuration
//! - [`date`]: cached `Date` header values
//!
//! # Error Handling
//!
//! - [`protocol::HttpError`]: top-level error type
//! - [`protocol::SendError`]: response sending errors, including misuse of the response api
//!
//! Once a response has started on the wire, an error leaves it truncated and the
//! connection is not reused, so the client detects the incomplete transfer.
//!
//! # Limitations
//!
//! - HTTP/1.x only
//! - Request parsing and request body decoding are left to the caller

pub mod codec;
pub mod compression;
pub mod config;
pub mod connection;
pub mod date;
pub mod pool;
pub mod protocol;
pub mod response;
pub mod writer;

mod utils;
