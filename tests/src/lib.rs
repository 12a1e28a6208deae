//! # GSS Negotiation Test Suite
//!
//! Unified test crate containing:
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs       # Managers, names, credentials, handshake driver
//! ├── benchmarks/       # Criterion benchmarks (driven from benches/)
//! │   ├── token_header.rs
//! │   ├── sequence.rs
//! │   └── handshake.rs
//! │
//! ├── exploits/         # Attack simulations against the negotiation core
//! │   ├── malformed_tokens.rs
//! │   ├── mechanism_confusion.rs
//! │   ├── reflection.rs
//! │   └── replay.rs
//! │
//! └── integration/      # Manager-level flows across mechanisms and providers
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p gss-tests
//!
//! # By category
//! cargo test -p gss-tests integration::
//! cargo test -p gss-tests exploits::
//!
//! # Benchmarks
//! cargo bench -p gss-tests
//! ```

#![allow(unused_variables)]
#![allow(unused_imports)]
#![allow(dead_code)]

pub mod exploits;
