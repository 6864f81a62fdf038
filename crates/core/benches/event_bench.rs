//! Event parsing and header access benchmarks.

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use netspan_core::event::{HeaderKey, Headers, HttpEvent};

const SMALL_EVENT: &str = r#"{"request":{"header":{"request-line":"GET /api/v1/users HTTP/1.1","Host":"api.example.com","Accept":"*/*"},"body":""},"response":{"header":{"response-line":"HTTP/1.1 200 OK","Content-Type":"application/json"},"body":"[]"},"metadata":{"src_ip":"10.0.0.5","src_port":51514,"dest_ip":"10.0.0.9","dest_port":443,"timestamp":"2024-05-01T12:00:00Z"}}"#;

fn large_event() -> String {
    let body = "x".repeat(64 * 1024);
    format!(
        r#"{{"request":{{"header":{{"request-line":"POST /upload HTTP/1.1","Host":"api.example.com","Content-Type":"text/plain"}},"body":"{body}"}},"response":{{"header":{{"response-line":"HTTP/1.1 201 Created"}},"body":""}},"metadata":{{"src_ip":"10.0.0.5","src_port":51514,"dest_ip":"10.0.0.9","dest_port":80,"timestamp":"2024-05-01T12:00:00Z"}}}}"#
    )
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_parse");
    group.throughput(Throughput::Elements(1));

    group.bench_function("small", |b| {
        b.iter(|| HttpEvent::from_line(black_box(SMALL_EVENT)))
    });

    let large = large_event();
    group.bench_function("body_64k", |b| {
        b.iter(|| HttpEvent::from_line(black_box(&large)))
    });

    group.finish();
}

fn bench_headers(c: &mut Criterion) {
    let headers: Headers = (0..32)
        .map(|i| (format!("X-Header-{i}"), format!("value-{i}")))
        .chain([("content-type".to_owned(), "text/html".to_owned())])
        .collect();

    let mut group = c.benchmark_group("headers");

    group.bench_function("case_insensitive_lookup", |b| {
        b.iter(|| black_box(&headers).get(HeaderKey::ContentType))
    });

    group.bench_function("canonical_string", |b| {
        b.iter(|| black_box(&headers).to_canonical_string())
    });

    group.finish();
}

criterion_group!(benches, bench_parse, bench_headers);
criterion_main!(benches);
