//! # Domain Layer
//!
//! Mechanism-independent negotiation logic. Nothing here knows a
//! mechanism's wire format; mechanisms are reached through the driven
//! ports in [`crate::ports`].
//!
//! ## Components
//!
//! - `token_header`: framing of context tokens with the mechanism identifier
//! - `sequence`: per-message replay and ordering classification
//! - `registry`: provider preference list and factory cache
//! - `credential`: per-(mechanism, usage) credential elements
//! - `context`: the security context state machine
//! - `config`: manager configuration

pub mod config;
pub mod context;
pub mod credential;
pub mod registry;
pub mod sequence;
pub mod token_header;

pub use config::ManagerConfig;
pub use context::{ContextRole, ContextState, SecurityContext};
pub use credential::{Credential, CredentialSlot};
pub use registry::{
    FactoryConstructor, MechanismRegistry, Provider, ProviderHandle, ResolvedFactory,
};
pub use sequence::{SequenceTracker, MAX_INTERVALS};
pub use token_header::{TokenHeader, MAX_LENGTH_OCTETS, TOKEN_ID};
