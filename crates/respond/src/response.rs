//! The response of one request, from status line to the last body byte.
//!
//! [`HttpResponse`] owns what the application queues (status, headers, cookies, one
//! body source) and the connection header accumulator. It moves through
//! [`ResponseState`]:
//!
//! ```text
//! NotStarted -> HeadersBuilding -> HeadersSent -> Closed
//! ```
//!
//! Queued headers and cookies are serialized into the accumulator by
//! [`flush_headers`](HttpResponse::flush_headers) and cleared, so flushing repeatedly never
//! duplicates a header. The framing header, `Content-Length` or `Transfer-Encoding`, is owned
//! by the response and written last, right before the header block goes out.

use crate::codec::{HeaderAccumulator, HeaderWriter};
use crate::compression::{CompressionContext, CompressionMethod, CompressionMethods};
use crate::config::CompressionConfig;
use crate::connection::ConnectionStreams;
use crate::date::DateService;
use crate::protocol::{ByteRange, Cookie, PayloadSize, RequestMeta, ResponseBody, SendError};
use crate::utils::ensure;
use crate::writer::{BufferedSink, EntityWriter};
use http::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_RANGE, DATE, TRANSFER_ENCODING, VARY};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Version};
use std::fmt;
use std::fmt::Write;
use std::mem;
use tokio::io::AsyncWrite;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseState {
    NotStarted,
    HeadersBuilding,
    HeadersSent,
    Closed,
}

impl ResponseState {
    /// Returns true while status and headers may still change
    #[inline]
    pub fn is_mutable(&self) -> bool {
        matches!(self, ResponseState::NotStarted | ResponseState::HeadersBuilding)
    }
}

/// How the entity of a response goes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPolicy {
    /// the framing header, `None` when the body is delimited by closing the connection
    pub payload: Option<PayloadSize>,
    pub compression: Option<CompressionMethod>,
    /// entity bytes to write, `None` when written until the source ends
    pub limit: Option<u64>,
}

impl TransferPolicy {
    pub fn is_close_delimited(&self) -> bool {
        self.payload.is_none()
    }
}

/// Returns false for the statuses that never carry a body, nor a framing header.
fn status_allows_body(status: StatusCode) -> bool {
    !(status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED)
}

fn is_framing_header(name: &HeaderName) -> bool {
    name == CONTENT_LENGTH || name == TRANSFER_ENCODING
}

/// True when a queued `Vary` header already names `Accept-Encoding` or is `*`
fn varies_on_encoding(headers: &HeaderMap) -> bool {
    headers.get_all(VARY).iter().any(|value| {
        value.as_bytes().split(|&byte| byte == b',').any(|field| {
            let field = field.trim_ascii();
            field == b"*" || field.eq_ignore_ascii_case(b"accept-encoding")
        })
    })
}

fn write_header_line(writer: &mut HeaderWriter<'_>, name: &str, value: &[u8], title_case: bool) -> fmt::Result {
    writer.write_header_name(name, title_case)?;
    writer.write_str(": ")?;
    writer.write_bytes(value)?;
    writer.write_str("\r\n")
}

#[derive(Debug)]
pub struct HttpResponse {
    version: Version,
    status: StatusCode,
    headers: HeaderMap,
    cookies: Vec<Cookie>,
    accumulator: HeaderAccumulator,
    state: ResponseState,
    body: ResponseBody,
    range: Option<ByteRange>,
    content_encoded: bool,
    title_case: bool,
}

impl HttpResponse {
    pub fn new(accumulator: HeaderAccumulator, title_case: bool) -> Self {
        Self {
            version: Version::HTTP_11,
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            accumulator,
            state: ResponseState::NotStarted,
            body: ResponseBody::Empty,
            range: None,
            content_encoded: false,
            title_case,
        }
    }

    /// Prepares the response for the next request of the connection
    pub fn reset(&mut self, version: Version) {
        self.version = version;
        self.status = StatusCode::OK;
        self.headers.clear();
        self.cookies.clear();
        self.accumulator.reset();
        self.state = ResponseState::NotStarted;
        self.body.close();
        self.range = None;
        self.content_encoded = false;
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn state(&self) -> ResponseState {
        self.state
    }

    /// Headers queued since the last flush
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    /// # Errors
    ///
    /// Returns [`SendError::HeadersSent`] once the status line may already be on the wire.
    pub fn set_status_code(&mut self, status: StatusCode) -> Result<(), SendError> {
        ensure!(self.state == ResponseState::NotStarted, SendError::HeadersSent);
        self.status = status;
        Ok(())
    }

    /// Queues a header, replacing the values queued under the same name.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::HeadersSent`] after the headers have been sent, and
    /// [`SendError::ReservedHeader`] for `Content-Length` and `Transfer-Encoding` which are
    /// derived from the body.
    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) -> Result<(), SendError> {
        self.check_header(&name)?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Queues a header next to the values already queued under the same name.
    ///
    /// # Errors
    ///
    /// Same as [`insert_header`](Self::insert_header).
    pub fn append_header(&mut self, name: HeaderName, value: HeaderValue) -> Result<(), SendError> {
        self.check_header(&name)?;
        self.headers.append(name, value);
        Ok(())
    }

    fn check_header(&mut self, name: &HeaderName) -> Result<(), SendError> {
        ensure!(self.state.is_mutable(), SendError::HeadersSent);
        ensure!(!is_framing_header(name), SendError::reserved_header(name));
        if name == CONTENT_ENCODING {
            self.content_encoded = true;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`SendError::HeadersSent`] after the headers have been sent, and
    /// [`SendError::InvalidCookie`] when the cookie cannot be written as a header line.
    pub fn add_cookie(&mut self, cookie: Cookie) -> Result<(), SendError> {
        ensure!(self.state.is_mutable(), SendError::HeadersSent);
        cookie.validate()?;
        self.cookies.push(cookie);
        Ok(())
    }

    /// Sets the body source, replacing and closing a previous one.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::HeadersSent`] after the headers have been sent.
    pub fn set_body<B: Into<ResponseBody>>(&mut self, body: B) -> Result<(), SendError> {
        ensure!(self.state.is_mutable(), SendError::HeadersSent);
        self.body.close();
        self.body = body.into();
        Ok(())
    }

    /// Restricts the entity to `range` of a body of `total` bytes, answering `206 Partial Content`.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::HeadersSent`] once the status line may already be on the wire, and
    /// [`SendError::InvalidBody`] when the range does not lie within the body.
    pub fn set_range(&mut self, range: ByteRange, total: u64) -> Result<(), SendError> {
        ensure!(self.state == ResponseState::NotStarted, SendError::HeadersSent);
        ensure!(
            range.fits(total),
            SendError::invalid_body(format!("range {}-{} is outside of {total} bytes", range.first(), range.last()))
        );

        let content_range = HeaderValue::try_from(range.content_range(total).to_string())
            .map_err(|e| SendError::invalid_body(e.to_string()))?;
        self.headers.insert(CONTENT_RANGE, content_range);
        self.status = StatusCode::PARTIAL_CONTENT;
        self.range = Some(range);
        Ok(())
    }

    /// Serializes what has been queued since the last call into the header accumulator.
    ///
    /// The first call writes the status line and the `Date` header. Queued headers and
    /// cookies are cleared once written.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::HeadersSent`] after the headers have been sent, and
    /// [`SendError::HeaderOverflow`] when the header block does not fit the accumulator.
    pub fn flush_headers(&mut self) -> Result<(), SendError> {
        ensure!(self.state.is_mutable(), SendError::HeadersSent);
        let capacity = self.accumulator.capacity();
        self.write_queued().map_err(|_overflow| SendError::header_overflow(capacity))
    }

    fn write_queued(&mut self) -> fmt::Result {
        let title_case = self.title_case;
        let mut writer = self.accumulator.writer();

        if self.state == ResponseState::NotStarted {
            write!(
                writer,
                "{:?} {} {}\r\n",
                self.version,
                self.status.as_str(),
                self.status.canonical_reason().unwrap_or_default()
            )?;
            write_header_line(&mut writer, DATE.as_str(), &DateService::global().http_date(), title_case)?;
            self.state = ResponseState::HeadersBuilding;
        }

        for (name, value) in &self.headers {
            write_header_line(&mut writer, name.as_str(), value.as_bytes(), title_case)?;
        }
        self.headers.clear();

        let set_cookie = if title_case { "Set-Cookie" } else { "set-cookie" };
        for cookie in self.cookies.drain(..) {
            cookie.write_header(set_cookie, &mut writer)?;
        }
        Ok(())
    }

    fn write_framing(&mut self, payload: Option<PayloadSize>) -> fmt::Result {
        if !status_allows_body(self.status) {
            return Ok(());
        }

        let title_case = self.title_case;
        let mut writer = self.accumulator.writer();
        match payload {
            Some(PayloadSize::Length(length)) => {
                writer.write_header_name(CONTENT_LENGTH.as_str(), title_case)?;
                write!(writer, ": {length}\r\n")
            }
            Some(PayloadSize::Empty) => {
                writer.write_header_name(CONTENT_LENGTH.as_str(), title_case)?;
                writer.write_str(": 0\r\n")
            }
            Some(PayloadSize::Chunked) => {
                writer.write_header_name(TRANSFER_ENCODING.as_str(), title_case)?;
                writer.write_str(": chunked\r\n")
            }
            None => Ok(()),
        }
    }

    async fn write_head<W>(&mut self, streams: &mut ConnectionStreams<W>, payload: Option<PayloadSize>) -> Result<(), SendError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        self.flush_headers()?;
        let capacity = self.accumulator.capacity();
        self.write_framing(payload).map_err(|_overflow| SendError::header_overflow(capacity))?;
        self.accumulator.write_termination()?;

        streams.direct_writer()?.write_all(self.accumulator.response_data()).await?;
        self.accumulator.reset();
        self.state = ResponseState::HeadersSent;
        Ok(())
    }

    /// Writes the framing header for `payload`, terminates the header block and sends it.
    ///
    /// Body bytes may only be written to the connection writers after this returns.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::HeadersSent`] if the headers have already been sent,
    /// [`SendError::HeaderOverflow`] or the transport error.
    pub async fn complete_headers<W>(&mut self, streams: &mut ConnectionStreams<W>, payload: PayloadSize) -> Result<(), SendError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        self.write_head(streams, Some(payload)).await
    }

    /// Sends an interim `100 Continue` response ahead of this response.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::HeadersSent`] once this response has started, or the transport error.
    pub async fn send_early_100_continue<W>(&mut self, streams: &mut ConnectionStreams<W>) -> Result<(), SendError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        ensure!(self.state == ResponseState::NotStarted, SendError::HeadersSent);
        let capacity = self.accumulator.capacity();
        write!(self.accumulator.writer(), "{:?} 100 Continue\r\n", self.version)
            .map_err(|_overflow| SendError::header_overflow(capacity))?;
        self.accumulator.write_termination()?;

        let mut writer = streams.direct_writer()?;
        let sent = writer.write_all(self.accumulator.response_data()).await;
        self.accumulator.reset();
        sent?;
        writer.flush().await
    }

    /// Picks the content coding for this response, `None` when it should not be compressed.
    pub fn negotiate_compression(
        &self,
        request: &RequestMeta,
        config: &CompressionConfig,
        supported: CompressionMethods,
    ) -> Option<CompressionMethod> {
        let eligible = config.enabled
            && self.state.is_mutable()
            && !request.is_head()
            // compressed entities are always chunked
            && self.version == Version::HTTP_11
            && status_allows_body(self.status)
            && !self.content_encoded
            && self.range.is_none()
            && self.body.has_data()
            && config.accepts_length(self.body.length());

        if !eligible {
            return None;
        }
        request.accepted_encodings().negotiate(supported)
    }

    /// Chooses the framing of the entity, `compression` being the coding actually in use.
    pub fn transfer_policy(&self, compression: Option<CompressionMethod>) -> TransferPolicy {
        if !status_allows_body(self.status) {
            return TransferPolicy { payload: Some(PayloadSize::Empty), compression: None, limit: Some(0) };
        }

        if compression.is_some() {
            return TransferPolicy { payload: Some(PayloadSize::Chunked), compression, limit: None };
        }

        let length = match self.range {
            Some(range) => Some(range.len()),
            None => self.body.length(),
        };
        let payload = match length {
            Some(0) => Some(PayloadSize::Empty),
            Some(length) => Some(PayloadSize::Length(length)),
            None if self.version == Version::HTTP_11 => Some(PayloadSize::Chunked),
            None => None,
        };
        TransferPolicy { payload, compression: None, limit: length }
    }

    /// Sends the header block and the entity.
    ///
    /// With a compression context the entity is compressed and chunked, otherwise it goes
    /// with `Content-Length` when its length is known and chunked when it is not. With
    /// `head_only`, or for a status without a body, only the header block is sent, still
    /// describing the full entity. The response must be finished with [`close`](Self::close).
    ///
    /// Returns the policy the entity was sent with.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::InvalidBody`] when a body ends before its declared length, and
    /// the errors of the header block, the body source, the compressor or the transport.
    /// Once headers are on the wire, an error leaves the response truncated.
    pub async fn send<W>(
        &mut self,
        streams: &mut ConnectionStreams<W>,
        copy_buffer: &mut [u8],
        mut compression: Option<&mut CompressionContext>,
        head_only: bool,
    ) -> Result<TransferPolicy, SendError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        ensure!(self.state.is_mutable(), SendError::HeadersSent);
        let policy = self.transfer_policy(compression.as_deref().map(CompressionContext::method));
        debug!(payload = ?policy.payload, compression = ?policy.compression, head_only, "transfer policy selected");

        if let Some(method) = policy.compression {
            self.headers.insert(CONTENT_ENCODING, HeaderValue::from_static(method.content_encoding()));
            if !varies_on_encoding(&self.headers) {
                self.headers.append(VARY, HeaderValue::from_static("accept-encoding"));
            }
        }

        if head_only || !status_allows_body(self.status) {
            self.write_head(streams, policy.payload).await?;
            self.body.close();
            return Ok(policy);
        }

        let mut body = mem::take(&mut self.body);
        if let Some(range) = self.range {
            body.skip(range.first()).await?;
        }
        self.write_head(streams, policy.payload).await?;

        let mut writer = EntityWriter::new(copy_buffer);
        match (compression.as_deref_mut(), policy.payload) {
            (Some(context), _) => {
                let mut sink = streams.chunked_writer()?;
                writer.write_compressed(&mut body, context.compressor_mut(), &mut sink).await?;
            }
            (None, Some(PayloadSize::Chunked)) => {
                let mut sink = streams.chunked_writer()?;
                writer.write(&mut body, &mut sink, None).await?;
                sink.flush(true).await?;
            }
            (None, Some(PayloadSize::Length(length))) => {
                let mut sink = streams.direct_writer()?;
                let written = writer.write(&mut body, &mut sink, Some(length)).await?;
                ensure!(
                    written == length,
                    SendError::invalid_body(format!("body produced {written} bytes, {length} declared"))
                );
            }
            (None, Some(PayloadSize::Empty)) => body.close(),
            (None, None) => {
                let mut sink = streams.direct_writer()?;
                writer.write(&mut body, &mut sink, None).await?;
            }
        }
        Ok(policy)
    }

    /// Finishes the response, sending a bodiless header block if nothing has been sent yet.
    ///
    /// # Errors
    ///
    /// Returns the errors of the header block or the transport.
    pub async fn close<W>(&mut self, streams: &mut ConnectionStreams<W>) -> Result<(), SendError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        match self.state {
            ResponseState::Closed => return Ok(()),
            ResponseState::NotStarted | ResponseState::HeadersBuilding => {
                self.write_head(streams, Some(PayloadSize::Empty)).await?;
            }
            ResponseState::HeadersSent => {}
        }

        streams.direct_writer()?.flush().await?;
        self.body.close();
        self.state = ResponseState::Closed;
        Ok(())
    }

    pub fn into_accumulator(self) -> HeaderAccumulator {
        self.accumulator
    }
}
