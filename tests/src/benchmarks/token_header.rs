//! # Token Header Benchmarks
//!
//! Framing and splitting across the length-field boundaries (short form,
//! one, two and three length octets).

use criterion::{black_box, BenchmarkId, Criterion, Throughput};
use gss_context::{Oid, TokenHeader};

const BODY_SIZES: [usize; 4] = [64, 200, 4_096, 70_000];

pub fn frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("token_header/frame");

    for size in BODY_SIZES {
        let body = vec![0xa5u8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &body, |b, body| {
            b.iter(|| black_box(TokenHeader::frame(&Oid::KRB5, body).unwrap()))
        });
    }

    group.finish();
}

pub fn split(c: &mut Criterion) {
    let mut group = c.benchmark_group("token_header/split");

    for size in BODY_SIZES {
        let framed = TokenHeader::frame(&Oid::SPNEGO, &vec![0x5au8; size]).unwrap();
        group.throughput(Throughput::Bytes(framed.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &framed, |b, framed| {
            b.iter(|| {
                let (header, body) = TokenHeader::split(black_box(framed)).unwrap();
                black_box((header.mechanism_token_len(), body.len()))
            })
        });
    }

    group.finish();
}

/// Garbage is rejected without touching the body.
pub fn reject(c: &mut Criterion) {
    let hostile = [0x60u8, 0x84, 0x7f, 0xff, 0xff, 0xff, 0x06, 0x84, 0x7f, 0xff, 0xff, 0x00];
    c.bench_function("token_header/reject_hostile_length", |b| {
        b.iter(|| black_box(TokenHeader::split(black_box(&hostile)).is_err()))
    });
}
