use crate::codec::{ChunkAccumulator, HeaderAccumulator};
use crate::compression::{CompressionContext, CompressionMethods, CompressorFactory};
use crate::config::ResponseConfig;
use crate::connection::{ConnectionBuffers, ConnectionStreams};
use crate::pool::{MemoryPool, PooledBuffer};
use crate::protocol::{HttpError, RequestMeta, SendError};
use crate::response::{HttpResponse, TransferPolicy};
use crate::utils::ensure;
use http::Version;
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::select;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
struct ActiveRequest {
    meta: RequestMeta,
    cancellation: CancellationToken,
    deadline: Instant,
}

/// Sends the responses of one connection.
///
/// The connection buffers are allocated once in [`accept`](Self::accept) and reused by
/// every request. Each request goes through:
///
/// 1. [`begin_request`](Self::begin_request): resets the response, answers
///    `Expect: 100-continue` and opens the request cancellation scope
/// 2. [`response_mut`](Self::response_mut): the application sets status, headers,
///    cookies and body
/// 3. [`send_response`](Self::send_response): negotiates compression, writes the response
///    within the send deadline and closes it
///
/// Any failure while sending marks the connection as not reusable, a partially written
/// response cannot be resumed. [`release`](Self::release) gives the buffers back to the pool.
pub struct ResponseConnection<W> {
    config: Arc<ResponseConfig>,
    pool: Arc<dyn MemoryPool>,
    compressors: Option<Arc<dyn CompressorFactory>>,
    streams: ConnectionStreams<W>,
    response: HttpResponse,
    copy_buffer: PooledBuffer,
    request: Option<ActiveRequest>,
    cancellation: CancellationToken,
    reusable: bool,
}

impl<W> ResponseConnection<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Allocates the connection buffers and binds the transport.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::ConfigError`] when the config is rejected by
    /// [`ResponseConfig::validate`], and [`HttpError::AllocError`] when the pool fails.
    pub fn accept(transport: W, config: Arc<ResponseConfig>, pool: Arc<dyn MemoryPool>) -> Result<Self, HttpError> {
        config.validate()?;
        let ConnectionBuffers { header, chunk, copy } = ConnectionBuffers::allocate(pool.as_ref(), &config)?;

        let mut streams = ConnectionStreams::new(ChunkAccumulator::new(chunk));
        streams.bind(transport);
        let response = HttpResponse::new(HeaderAccumulator::new(header, config.header_charset), config.title_case_headers);

        Ok(Self {
            config,
            pool,
            compressors: None,
            streams,
            response,
            copy_buffer: copy,
            request: None,
            cancellation: CancellationToken::new(),
            reusable: true,
        })
    }

    #[must_use]
    pub fn with_compressors(mut self, compressors: Arc<dyn CompressorFactory>) -> Self {
        self.compressors = Some(compressors);
        self
    }

    /// Ties the connection to a parent scope, e.g. server shutdown
    #[must_use]
    pub fn with_cancellation(mut self, parent: &CancellationToken) -> Self {
        self.cancellation = parent.child_token();
        self
    }

    /// Cancelling this token aborts any response being sent on the connection
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Cancelling this token aborts the response of the current request only
    pub fn request_cancellation(&self) -> Option<CancellationToken> {
        self.request.as_ref().map(|request| request.cancellation.clone())
    }

    pub fn request(&self) -> Option<&RequestMeta> {
        self.request.as_ref().map(|request| &request.meta)
    }

    pub fn is_reusable(&self) -> bool {
        self.reusable
    }

    pub fn response_mut(&mut self) -> &mut HttpResponse {
        &mut self.response
    }

    /// Starts a new request on the connection.
    ///
    /// The interim `100 Continue` is sent outside of the request cancellation scope.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Unbound`] after the connection has been unbound, or the transport
    /// error raised while sending `100 Continue`.
    pub async fn begin_request(&mut self, meta: RequestMeta) -> Result<(), SendError> {
        ensure!(self.streams.is_bound(), SendError::Unbound);

        let version = meta.response_version(self.config.default_version.into());
        self.response.reset(version);
        self.streams.on_new_request();

        if meta.expects_continue() && self.config.send_100_continue && version == Version::HTTP_11 {
            if let Err(e) = self.response.send_early_100_continue(&mut self.streams).await {
                self.reusable = false;
                return Err(e);
            }
            info!("receive expect request header, sent continue response");
        }

        self.request = Some(ActiveRequest {
            meta,
            cancellation: self.cancellation.child_token(),
            deadline: Instant::now() + self.config.send_timeout(),
        });
        Ok(())
    }

    /// Sends the response of the current request.
    ///
    /// The write races the request cancellation token and the send deadline, closing the
    /// response is not cancellable.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::NoActiveRequest`] without a prior [`begin_request`](Self::begin_request),
    /// [`SendError::Cancelled`], [`SendError::Timeout`], or the error of the response. Every
    /// error but the first marks the connection as not reusable.
    pub async fn send_response(&mut self) -> Result<(), SendError> {
        let request = self.request.take().ok_or(SendError::NoActiveRequest)?;

        let written = select! {
            biased;
            () = request.cancellation.cancelled() => Err(SendError::Cancelled),
            sent = tokio::time::timeout_at(request.deadline, self.write_response(&request.meta)) => {
                sent.unwrap_or_else(|_elapsed| Err(SendError::Timeout))
            }
        };

        let outcome = match written {
            Ok(policy) => self.response.close(&mut self.streams).await.map(|()| policy),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(policy) => {
                self.streams.on_complete();
                if policy.is_close_delimited() {
                    debug!("response body delimited by connection close");
                    self.reusable = false;
                }
                Ok(())
            }
            Err(e) => {
                self.reusable = false;
                error!(cause = %e, "response aborted, connection will not be reused");
                Err(e)
            }
        }
    }

    /// Sends the response while `discard` drains the unread request body.
    ///
    /// Both run concurrently and both complete before this returns.
    ///
    /// # Errors
    ///
    /// Returns the error of [`send_response`](Self::send_response), or the discard io error.
    pub async fn send_response_with_discard<F>(&mut self, discard: F) -> Result<(), SendError>
    where
        F: Future<Output = io::Result<()>>,
    {
        let (sent, discarded) = tokio::join!(self.send_response(), discard);
        if let Err(e) = discarded {
            self.reusable = false;
            warn!(cause = %e, "can't discard request body, connection will not be reused");
            sent?;
            return Err(SendError::io(e));
        }
        sent
    }

    async fn write_response(&mut self, meta: &RequestMeta) -> Result<TransferPolicy, SendError> {
        let supported = self.compressors.as_ref().map_or(CompressionMethods::empty(), |factory| factory.supported());
        let negotiated = self.response.negotiate_compression(meta, &self.config.compression, supported);

        let mut context = match (negotiated, &self.compressors) {
            (Some(method), Some(factory)) => {
                match CompressionContext::init(factory.as_ref(), method, self.config.compression.level) {
                    Ok(context) => Some(context),
                    Err(e) => {
                        warn!(%method, cause = %e, "compressor init failed, fall back to identity encoding");
                        None
                    }
                }
            }
            _ => None,
        };

        self.response.send(&mut self.streams, &mut self.copy_buffer, context.as_mut(), meta.is_head()).await
    }

    /// Gives the buffers back to the pool and returns the transport, `None` when the
    /// connection is not reusable.
    pub fn release(self) -> Option<W> {
        let Self { pool, streams, response, copy_buffer, reusable, .. } = self;
        let (transport, chunk) = streams.into_parts();

        ConnectionBuffers { header: response.into_accumulator().into_buffer(), chunk: chunk.into_buffer(), copy: copy_buffer }
            .release(pool.as_ref());
        debug!(reusable, "connection released");
        transport.filter(|_| reusable)
    }
}

impl<W> fmt::Debug for ResponseConnection<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseConnection")
            .field("request", &self.request)
            .field("state", &self.response.state())
            .field("reusable", &self.reusable)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{HeapPool, MockMemoryPool};
    use crate::protocol::AllocError;
    use http::Method;

    fn accept(config: ResponseConfig) -> ResponseConnection<Vec<u8>> {
        ResponseConnection::accept(Vec::new(), Arc::new(config), Arc::new(HeapPool)).unwrap()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ResponseConfig { chunk_buffer_size: 8, ..ResponseConfig::default() };
        let result = ResponseConnection::accept(Vec::<u8>::new(), Arc::new(config), Arc::new(HeapPool));
        assert!(matches!(result, Err(HttpError::ConfigError { .. })));
    }

    #[test]
    fn allocation_failure_is_reported() {
        let mut pool = MockMemoryPool::new();
        pool.expect_allocate().returning(|size| Err(AllocError::new(size)));
        let result = ResponseConnection::accept(Vec::<u8>::new(), Arc::new(ResponseConfig::default()), Arc::new(pool));
        assert!(matches!(result, Err(HttpError::AllocError { .. })));
    }

    #[tokio::test]
    async fn send_without_request() {
        let mut connection = accept(ResponseConfig::default());
        assert!(matches!(connection.send_response().await, Err(SendError::NoActiveRequest)));
        assert!(connection.is_reusable());
    }

    #[tokio::test]
    async fn continue_is_skipped_when_disabled() {
        let mut connection = accept(ResponseConfig { send_100_continue: false, ..ResponseConfig::default() });
        let meta = RequestMeta::new(Method::POST, Version::HTTP_11).with_expect_continue(true);
        connection.begin_request(meta).await.unwrap();
        connection.send_response().await.unwrap();

        let wire = connection.release().unwrap();
        assert!(wire.starts_with(b"HTTP/1.1 200 OK\r\n"));
    }

    #[tokio::test]
    async fn unsupported_version_uses_default() {
        let mut connection = accept(ResponseConfig::default());
        connection.begin_request(RequestMeta::new(Method::GET, Version::HTTP_09)).await.unwrap();
        assert_eq!(connection.response_mut().version(), Version::HTTP_11);
        connection.send_response().await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_request_is_not_reusable() {
        let mut connection = accept(ResponseConfig::default());
        connection.begin_request(RequestMeta::new(Method::GET, Version::HTTP_11)).await.unwrap();
        connection.response_mut().set_body("never sent").unwrap();
        connection.request_cancellation().unwrap().cancel();

        assert!(matches!(connection.send_response().await, Err(SendError::Cancelled)));
        assert!(!connection.is_reusable());
        assert!(connection.release().is_none());
    }

    #[tokio::test]
    async fn connection_cancellation_reaches_requests() {
        let parent = CancellationToken::new();
        let mut connection = accept(ResponseConfig::default()).with_cancellation(&parent);
        connection.begin_request(RequestMeta::new(Method::GET, Version::HTTP_11)).await.unwrap();
        parent.cancel();

        assert!(matches!(connection.send_response().await, Err(SendError::Cancelled)));
    }
}
