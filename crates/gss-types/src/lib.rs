//! # GSS Types Crate
//!
//! Shared vocabulary for the security-context negotiation workspace.
//!
//! ## Contents
//!
//! - **Object identifiers** (`oid`): mechanism and name-type identifiers with
//!   their DER encoding.
//! - **Entities** (`entities`): names, usage directions, lifetimes, request
//!   flags, channel bindings and per-message properties.
//! - **Errors** (`errors`): the error taxonomy every component reports with.

pub mod entities;
pub mod errors;
pub mod oid;

pub use entities::*;
pub use errors::*;
pub use oid::{der_length_octets, Oid, DER_OID_TAG};
