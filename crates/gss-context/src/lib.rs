//! # GSS Context Negotiation Core
//!
//! Mechanism-independent security-context negotiation in the style of
//! GSS-API. Applications talk to a [`SecurityManager`]; pluggable
//! mechanisms (Kerberos, SPNEGO, test mechanisms) sit behind the
//! [`MechanismFactory`] SPI and are resolved through a preference-ordered
//! [`MechanismRegistry`].
//!
//! ## Context Lifecycle
//!
//! ```text
//! [PreInit] ──first token──→ [InProgress] ──engine established──→ [Ready]
//!     │                           │                                 │
//!     └──────────── dispose / successful export ──────────────→ [Deleted]
//! ```
//!
//! | Stage | Method | Effect |
//! |-------|--------|--------|
//! | Start | `initiate(&[])` / `accept(token)` | Resolve mechanism, create engine |
//! | Step | `initiate` / `accept` | Strip/add the framing header, drive the engine |
//! | Protect | `protect` / `sign` | Per-message tokens once protection is ready |
//! | Transfer | `export_to_interprocess_token` | Native engines only, deletes the context |
//!
//! ## Token Framing
//!
//! Context tokens are wrapped as `0x60 | DER length | mechanism OID | body`
//! ([`TokenHeader`]), except for native engines and SPNEGO tokens after the
//! initiator's first.
//!
//! ## Module Structure (Hexagonal Architecture)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      OUTER LAYER                                │
//! │  adapters/config.rs - TomlConfigProvider                        │
//! │  test_utils/        - loopback and negotiating test mechanisms  │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ implements ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      MIDDLE LAYER                               │
//! │  ports/inbound.rs  - SecurityManagerApi trait                   │
//! │  ports/outbound.rs - MechanismFactory, MechanismContext,        │
//! │                      CredentialElement, ConfigProvider          │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      INNER LAYER                                │
//! │  domain/token_header - initial context token framing            │
//! │  domain/sequence     - per-message sequence classification      │
//! │  domain/registry     - provider preferences, factory cache      │
//! │  domain/credential   - multi-mechanism credential               │
//! │  domain/context      - context-establishment state machine      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Feature Flags
//!
//! - `config-file` (default) - `adapters::TomlConfigProvider`
//! - `test-utils` - in-memory mechanisms under `test_utils`

pub mod domain;
pub mod ports;
pub mod service;

#[cfg(feature = "config-file")]
pub mod adapters;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use domain::{
    ContextRole, ContextState, Credential, CredentialSlot, ManagerConfig, MechanismRegistry,
    Provider, ProviderHandle, ResolvedFactory, SecurityContext, SequenceTracker, TokenHeader,
};
pub use ports::{
    ConfigProvider, CredentialElement, MechanismContext, MechanismFactory, NameElement,
    SecurityManagerApi,
};
pub use service::SecurityManager;

#[cfg(feature = "config-file")]
pub use adapters::{ConfigError, TomlConfigProvider};

pub use gss_types::{
    ChannelBinding, CredentialUsage, ErrorKind, GssError, GssResult, Lifetime, MessageProp, Oid,
    PrincipalName, RequestFlags,
};
