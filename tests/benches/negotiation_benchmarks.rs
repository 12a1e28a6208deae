//! # GSS Negotiation Benchmarks
//!
//! | Component | Measured |
//! |-----------|----------|
//! | Token header | frame / split throughput, hostile-length rejection |
//! | Sequence tracker | in-order, lossy and shuffled classification |
//! | Context | full handshake, protect/unprotect round trip |

use criterion::{criterion_group, criterion_main};
use gss_tests::benchmarks::{handshake, sequence, token_header};

criterion_group!(
    codec,
    token_header::frame,
    token_header::split,
    token_header::reject
);
criterion_group!(tracking, sequence::in_order);
criterion_group!(contexts, handshake::establish, handshake::protect_round_trip);

criterion_main!(codec, tracking, contexts);
