//! # Handshake and Per-Message Benchmarks
//!
//! Full establishment through the manager (direct and negotiated) and
//! protect/unprotect round trips on an established pair.

use crate::fixtures::{acceptor, established_pair, initiator, manager, realm, run_handshake};
use criterion::{black_box, BenchmarkId, Criterion, Throughput};
use gss_context::{MessageProp, Oid};

pub fn establish(c: &mut Criterion) {
    let manager = manager(&realm());
    let mut group = c.benchmark_group("handshake");

    for (label, mechanism) in [("loopback", None), ("negotiated", Some(Oid::SPNEGO))] {
        group.bench_function(label, |b| {
            b.iter(|| {
                let mut client = initiator(&manager, "alice", mechanism.clone());
                let mut server = acceptor(&manager);
                black_box(run_handshake(&mut client, &mut server).unwrap())
            })
        });
    }

    group.finish();
}

pub fn protect_round_trip(c: &mut Criterion) {
    let manager = manager(&realm());
    let (mut client, mut server) = established_pair(&manager, None);
    let mut group = c.benchmark_group("per_message");

    for size in [64usize, 1_024, 16_384] {
        let message = vec![0x42u8; size];
        group.throughput(Throughput::Bytes(size as u64));
        for privacy in [false, true] {
            let id = BenchmarkId::new(if privacy { "sealed" } else { "integrity" }, size);
            group.bench_with_input(id, &message, |b, message| {
                b.iter(|| {
                    let mut prop = MessageProp::new(0, privacy);
                    let token = client.protect(message, &mut prop).unwrap();
                    black_box(server.unprotect(&token, &mut prop).unwrap())
                })
            });
        }
    }

    group.finish();
}
