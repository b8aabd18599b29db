/// Represents the framing of an HTTP response payload on the wire.
///
/// This enum is used to determine which framing header the response carries:
/// - Known length: `Content-Length: <n>` and the body written as is
/// - Chunked: `Transfer-Encoding: chunked` and the body framed into chunks
/// - Empty: `Content-Length: 0` and no body at all
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Payload with known length in bytes
    Length(u64),
    /// Payload using chunked transfer encoding
    Chunked,
    /// Empty payload (no body)
    Empty,
}

impl PayloadSize {
    /// Maps a signed content length to the payload framing, a negative length
    /// means the length is unknown and the payload must be chunked.
    pub fn from_content_length(content_length: i64) -> Self {
        match u64::try_from(content_length) {
            Ok(0) => PayloadSize::Empty,
            Ok(length) => PayloadSize::Length(length),
            Err(_) => PayloadSize::Chunked,
        }
    }

    /// Returns true if the payload uses chunked transfer encoding
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    /// Returns true if the payload is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }

    /// The value of the `Content-Length` header, `None` for chunked payloads
    #[inline]
    pub fn content_length(&self) -> Option<u64> {
        match self {
            PayloadSize::Length(length) => Some(*length),
            PayloadSize::Chunked => None,
            PayloadSize::Empty => Some(0),
        }
    }
}
