use std::hint::black_box;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method, Version};
use micro_respond::compression::NativeCompressorFactory;
use micro_respond::config::ResponseConfig;
use micro_respond::connection::ResponseConnection;
use micro_respond::pool::RecyclingPool;
use micro_respond::protocol::{RequestMeta, ResponseBody};
use std::io::Cursor;
use std::sync::Arc;
use tokio::io::Sink;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap()
}

fn connection() -> ResponseConnection<Sink> {
    let config = Arc::new(ResponseConfig::default());
    let pool = Arc::new(RecyclingPool::new(16));
    ResponseConnection::accept(tokio::io::sink(), config, pool)
        .unwrap()
        .with_compressors(Arc::new(NativeCompressorFactory))
}

fn body_of(size: usize) -> Vec<u8> {
    b"<li>micro respond benchmark line</li>\n".iter().copied().cycle().take(size).collect()
}

fn bench_hello_world(c: &mut Criterion) {
    let runtime = runtime();
    let mut connection = connection();

    c.bench_function("send_hello_world", |b| {
        b.iter(|| {
            runtime.block_on(async {
                connection.begin_request(RequestMeta::new(Method::GET, Version::HTTP_11)).await.unwrap();
                let response = connection.response_mut();
                response.insert_header(CONTENT_TYPE, HeaderValue::from_static("text/plain")).unwrap();
                response.set_body(black_box("Hello World!\r\n")).unwrap();
                connection.send_response().await.unwrap();
            });
        });
    });
}

fn bench_bodies(c: &mut Criterion) {
    let runtime = runtime();
    let mut connection = connection();
    let mut group = c.benchmark_group("send_body");

    for size in [4 * 1024, 64 * 1024, 1024 * 1024] {
        let body = body_of(size);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("memory", size), &body, |b, body| {
            b.iter(|| {
                runtime.block_on(async {
                    connection.begin_request(RequestMeta::new(Method::GET, Version::HTTP_11)).await.unwrap();
                    connection.response_mut().set_body(body.clone()).unwrap();
                    connection.send_response().await.unwrap();
                });
            });
        });

        group.bench_with_input(BenchmarkId::new("chunked_stream", size), &body, |b, body| {
            b.iter(|| {
                runtime.block_on(async {
                    connection.begin_request(RequestMeta::new(Method::GET, Version::HTTP_11)).await.unwrap();
                    connection.response_mut().set_body(ResponseBody::direct(Cursor::new(body.clone()), None)).unwrap();
                    connection.send_response().await.unwrap();
                });
            });
        });

        for encoding in ["gzip", "br", "zstd"] {
            group.bench_with_input(BenchmarkId::new(encoding, size), &body, |b, body| {
                b.iter(|| {
                    runtime.block_on(async {
                        let meta = RequestMeta::new(Method::GET, Version::HTTP_11).with_accept_encoding(encoding);
                        connection.begin_request(meta).await.unwrap();
                        connection.response_mut().set_body(body.clone()).unwrap();
                        connection.send_response().await.unwrap();
                    });
                });
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_hello_world, bench_bodies);
criterion_main!(benches);
