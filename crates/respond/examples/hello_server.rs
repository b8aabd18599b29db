use bytes::{Buf, BytesMut};
use http::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Version};
use micro_respond::compression::NativeCompressorFactory;
use micro_respond::config::ResponseConfig;
use micro_respond::connection::ResponseConnection;
use micro_respond::pool::{MemoryPool, RecyclingPool};
use micro_respond::protocol::{Cookie, HttpError, RequestMeta, ResponseBody, SendError};
use micro_respond::response::HttpResponse;
use std::io;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

// curl -v http://127.0.0.1:8080/
// curl -v --compressed http://127.0.0.1:8080/large
// curl -v -H "Expect: 100-continue" -d "name=hello" http://127.0.0.1:8080/stream
#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!(port = 8080, "start listening");
    let tcp_listener = match TcpListener::bind("127.0.0.1:8080").await {
        Ok(tcp_listener) => tcp_listener,
        Err(e) => {
            error!(cause = %e, "bind server error");
            return;
        }
    };

    let config = Arc::new(ResponseConfig::default());
    let pool: Arc<dyn MemoryPool> = Arc::new(RecyclingPool::new(256));
    let compressors = Arc::new(NativeCompressorFactory);
    loop {
        let (tcp_stream, _remote_addr) = match tcp_listener.accept().await {
            Ok(stream_and_addr) => stream_and_addr,
            Err(e) => {
                warn!(cause = %e, "failed to accept");
                continue;
            }
        };

        let config = Arc::clone(&config);
        let pool = Arc::clone(&pool);
        let compressors = Arc::clone(&compressors);

        tokio::spawn(async move {
            match serve(tcp_stream, config, pool, compressors).await {
                Ok(()) => {
                    info!("finished process, connection shutdown");
                }
                Err(e) => {
                    error!("service has error, cause {}, connection shutdown", e);
                }
            }
        });
    }
}

struct RequestHead {
    meta: RequestMeta,
    path: String,
    content_length: u64,
    keep_alive: bool,
}

async fn serve(
    tcp_stream: TcpStream,
    config: Arc<ResponseConfig>,
    pool: Arc<dyn MemoryPool>,
    compressors: Arc<NativeCompressorFactory>,
) -> Result<(), HttpError> {
    let header_limit = config.request_header_buffer_size;
    let (mut reader, writer) = tcp_stream.into_split();
    let mut connection = ResponseConnection::accept(writer, config, pool)?.with_compressors(compressors);
    let mut buffer = BytesMut::with_capacity(header_limit);

    while let Some(head) = read_head(&mut reader, &mut buffer, header_limit).await.map_err(SendError::from)? {
        connection.begin_request(head.meta).await?;
        route(connection.response_mut(), &head.path)?;

        // the head read may already hold part of the request body
        let buffered = usize::try_from(head.content_length).map_or(buffer.len(), |length| length.min(buffer.len()));
        buffer.advance(buffered);
        let unread = head.content_length - buffered as u64;
        connection.send_response_with_discard(discard(&mut reader, unread)).await?;

        if !head.keep_alive || !connection.is_reusable() {
            break;
        }
    }

    connection.release();
    Ok(())
}

async fn discard<R: AsyncRead + Unpin>(reader: &mut R, length: u64) -> io::Result<()> {
    let discarded = tokio::io::copy(&mut reader.take(length), &mut tokio::io::sink()).await?;
    if discarded < length {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "request body ended early"));
    }
    Ok(())
}

fn route(response: &mut HttpResponse, path: &str) -> Result<(), SendError> {
    response.insert_header(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"))?;
    match path {
        "/" => response.set_body("Hello World!\r\n"),
        "/large" => {
            let line = "micro respond compresses this line when the client accepts it\r\n";
            response.set_body(line.repeat(1024))
        }
        "/stream" => {
            let data = b"streamed without a known length\r\n".repeat(64);
            response.set_body(ResponseBody::direct(Cursor::new(data), None))
        }
        "/cookie" => {
            response.add_cookie(Cookie::new("visit", "1").with_max_age(Duration::from_secs(3600)).with_http_only(true))?;
            response.set_body("cookie set\r\n")
        }
        _ => {
            response.set_status_code(StatusCode::NOT_FOUND)?;
            response.set_body("404 not found\r\n")
        }
    }
}

async fn read_head<R>(reader: &mut R, buffer: &mut BytesMut, limit: usize) -> io::Result<Option<RequestHead>>
where
    R: AsyncRead + Unpin,
{
    loop {
        if !buffer.is_empty() {
            if let Some((head, parsed)) = parse_head(buffer)? {
                buffer.advance(parsed);
                return Ok(Some(head));
            }
        }

        if buffer.len() >= limit {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "request head exceeds the header buffer"));
        }
        if reader.read_buf(buffer).await? == 0 {
            return Ok(None);
        }
    }
}

fn parse_head(data: &[u8]) -> io::Result<Option<(RequestHead, usize)>> {
    let mut headers = [httparse::EMPTY_HEADER; 64];
    let mut request = httparse::Request::new(&mut headers);
    let parsed = match request.parse(data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))? {
        httparse::Status::Complete(parsed) => parsed,
        httparse::Status::Partial => return Ok(None),
    };

    let method = Method::from_bytes(request.method.unwrap_or_default().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let version = if request.version == Some(0) { Version::HTTP_10 } else { Version::HTTP_11 };

    let mut header_map = HeaderMap::with_capacity(request.headers.len());
    for header in request.headers.iter() {
        let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let value = HeaderValue::from_bytes(header.value).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        header_map.append(name, value);
    }

    let content_length = header_map
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(0);
    let connection = header_map.get(CONNECTION).map(HeaderValue::as_bytes);
    let keep_alive = if version == Version::HTTP_10 {
        connection.is_some_and(|value| value.eq_ignore_ascii_case(b"keep-alive"))
    } else {
        !connection.is_some_and(|value| value.eq_ignore_ascii_case(b"close"))
    };

    let head = RequestHead {
        meta: RequestMeta::from_headers(method, version, &header_map),
        path: request.path.unwrap_or("/").to_owned(),
        content_length,
        keep_alive,
    };
    Ok(Some((head, parsed)))
}
