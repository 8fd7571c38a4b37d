#![allow(clippy::all)]
//! Benchmarks for the opening handshake.
//!
//! Tests: request parsing, upgrade validation, accept token computation.

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use wsgate::handshake::{accept_token, switching_protocols, RequestParser};

const REQUEST: &str = "GET /chat?room=lobby HTTP/1.1\r\n\
                       Host: server.example.com\r\n\
                       Upgrade: websocket\r\n\
                       Connection: Upgrade\r\n\
                       Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
                       Origin: http://example.com\r\n\
                       Sec-WebSocket-Protocol: chat, superchat\r\n\
                       Sec-WebSocket-Version: 13\r\n\r\n";

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("handshake/parse");
    let parser = RequestParser::new().unwrap();

    group.bench_function("parse_request", |b| {
        b.iter(|| {
            black_box(parser.parse(black_box(REQUEST), Some("ws://server.example.com")).unwrap());
        });
    });

    group.bench_function("parse_and_verify", |b| {
        b.iter(|| {
            let handshake = parser.parse(black_box(REQUEST), None).unwrap();
            black_box(handshake.verify_upgrade());
        });
    });

    group.finish();
}

fn bench_response(c: &mut Criterion) {
    let mut group = c.benchmark_group("handshake/response");

    group.bench_function("accept_token", |b| {
        b.iter(|| {
            black_box(accept_token(black_box("dGhlIHNhbXBsZSBub25jZQ==")));
        });
    });

    group.bench_function("switching_protocols", |b| {
        let accept = accept_token("dGhlIHNhbXBsZSBub25jZQ==");
        b.iter(|| {
            black_box(switching_protocols(&accept, Some("chat")));
        });
    });

    group.finish();
}

criterion_group!(benches, bench_parse, bench_response);
criterion_main!(benches);
