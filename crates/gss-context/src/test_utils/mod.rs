//! # Test Mechanisms
//!
//! In-memory mechanisms for unit tests, integration tests and demos.
//!
//! - [`loopback`]: a keyed single-round-trip mechanism backed by an
//!   in-process realm.
//! - [`negotiation`]: a negotiating wrapper that selects one inner
//!   mechanism, standing in for SPNEGO.
//!
//! Enabled by the `test-utils` feature.

pub mod loopback;
pub mod negotiation;
mod wire;

pub use loopback::{
    LoopbackContext, LoopbackCredential, LoopbackFactory, LoopbackRealm, DEFAULT_LIFETIME,
    LOOPBACK_MECHANISM,
};
pub use negotiation::{NegotiationContext, NegotiationCredential, NegotiationFactory};

use crate::domain::{Provider, ProviderHandle};
use crate::ports::MechanismFactory;
use gss_types::Oid;
use std::sync::Arc;

/// Provider `"Loopback"` declaring the loopback mechanism and the
/// negotiating wrapper around it.
pub fn loopback_provider(realm: &LoopbackRealm) -> ProviderHandle {
    provider_for("Loopback", LoopbackFactory::new(realm.clone()))
}

/// Provider named `name` serving `factory` directly and through the
/// negotiating wrapper.
pub fn provider_for(name: &str, factory: LoopbackFactory) -> ProviderHandle {
    let factory: Arc<dyn MechanismFactory> = Arc::new(factory);
    let wrapped = Arc::clone(&factory);
    Provider::new(name)
        .with_factory(LOOPBACK_MECHANISM, move |_| Ok(Arc::clone(&factory)))
        .with_factory(Oid::SPNEGO, move |_| {
            Ok(Arc::new(NegotiationFactory::new(Arc::clone(&wrapped))) as Arc<dyn MechanismFactory>)
        })
        .into_handle()
}

/// Native provider `"LoopbackNative"` declaring only the loopback mechanism.
pub fn native_loopback_provider(realm: &LoopbackRealm) -> ProviderHandle {
    let factory: Arc<dyn MechanismFactory> = Arc::new(LoopbackFactory::new(realm.clone()).native());
    Provider::native("LoopbackNative")
        .with_factory(LOOPBACK_MECHANISM, move |_| Ok(Arc::clone(&factory)))
        .into_handle()
}
