use std::collections::TryReserveError;
use std::io;
use thiserror::Error;

use crate::compression::CompressionMethod;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },

    #[error("allocation error: {source}")]
    AllocError {
        #[from]
        source: AllocError,
    },

    #[error("config error: {source}")]
    ConfigError {
        #[from]
        source: ConfigError,
    },
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("response headers have already been sent")]
    HeadersSent,

    #[error("header `{name}` is managed by the response framing")]
    ReservedHeader { name: String },

    #[error("response header exceed the header buffer capacity {capacity}")]
    HeaderOverflow { capacity: usize },

    #[error("invalid cookie: {reason}")]
    InvalidCookie { reason: String },

    #[error("response writer is not bound to a connection")]
    Unbound,

    #[error("no request is active on this connection")]
    NoActiveRequest,

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("compression error: {source}")]
    Compression {
        #[from]
        source: CompressionError,
    },

    #[error("response send timeout")]
    Timeout,

    #[error("response send cancelled")]
    Cancelled,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn reserved_header<S: ToString>(name: S) -> Self {
        Self::ReservedHeader { name: name.to_string() }
    }

    pub fn header_overflow(capacity: usize) -> Self {
        Self::HeaderOverflow { capacity }
    }

    pub fn invalid_cookie<S: ToString>(str: S) -> Self {
        Self::InvalidCookie { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// Returns true if the error was raised by a misuse of the response api,
    /// rather than by the transport or the codec.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            SendError::HeadersSent
                | SendError::ReservedHeader { .. }
                | SendError::HeaderOverflow { .. }
                | SendError::InvalidCookie { .. }
                | SendError::Unbound
                | SendError::NoActiveRequest
        )
    }
}

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("compression method {0} is not supported")]
    Unsupported(CompressionMethod),

    #[error("compressor made no progress")]
    Stalled,

    #[error("compressor has already been finished")]
    Finished,

    #[error("codec io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

#[derive(Error, Debug)]
#[error("failed to allocate {requested} bytes from the memory pool")]
pub struct AllocError {
    requested: usize,
    #[source]
    source: Option<TryReserveError>,
}

impl AllocError {
    pub fn new(requested: usize) -> Self {
        Self { requested, source: None }
    }

    pub fn from_reserve(requested: usize, source: TryReserveError) -> Self {
        Self { requested, source: Some(source) }
    }

    pub fn requested(&self) -> usize {
        self.requested
    }
}

#[derive(Error, Debug)]
#[error("invalid response config: {reason}")]
pub struct ConfigError {
    reason: String,
}

impl ConfigError {
    pub fn new<S: ToString>(reason: S) -> Self {
        Self { reason: reason.to_string() }
    }
}
