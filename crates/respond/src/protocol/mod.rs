//! Protocol types of the response pipeline.
//!
//! - **Framing** ([`PayloadSize`]): which framing header a response carries
//! - **Body sources** ([`ResponseBody`]): at most one of memory, stream or direct per response
//! - **Cookies** ([`Cookie`], [`SameSite`]): `Set-Cookie` rendering
//! - **Ranges** ([`ByteRange`]): partial content selection
//! - **Request facts** ([`RequestMeta`]): what the response depends on from its request
//! - **Errors** ([`error`]):
//!   - [`HttpError`]: top-level error type
//!   - [`SendError`]: response sending errors
//!   - [`CompressionError`]: compressor failures
//!   - [`AllocError`]: memory pool failures
//!   - [`ConfigError`]: rejected configuration

mod body;
pub use body::BoxedReader;
pub use body::MemoryReader;
pub use body::ResponseBody;

mod cookie;
pub use cookie::Cookie;
pub use cookie::SameSite;

mod payload;
pub use payload::PayloadSize;

mod range;
pub use range::ByteRange;
pub use range::ContentRange;

mod request;
pub use request::RequestMeta;

pub mod error;
pub use error::AllocError;
pub use error::CompressionError;
pub use error::ConfigError;
pub use error::HttpError;
pub use error::SendError;
