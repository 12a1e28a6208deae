//! # Exploit Simulations
//!
//! Attacker-controlled tokens thrown at the negotiation core. Every case
//! must fail cleanly: an error of the right kind, no panic, and no state
//! change that would let a later genuine token be misinterpreted.

pub mod malformed_tokens;
pub mod mechanism_confusion;
pub mod reflection;
pub mod replay;
