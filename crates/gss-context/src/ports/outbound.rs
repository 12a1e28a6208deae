//! # Driven Ports (Mechanism SPI)
//!
//! The capabilities a mechanism must provide to be plugged into the core.
//! The core is written against these traits only and never inspects a
//! mechanism's concrete types; a mechanism may downcast its *own* elements
//! through `as_any`.

use crate::domain::ManagerConfig;
use gss_types::{
    ChannelBinding, CredentialUsage, GssError, GssResult, InquireType, InquireValue, Lifetime,
    MessageProp, Oid, PrincipalName, RequestFlags,
};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A name in one mechanism's internal form.
pub trait NameElement: Send + Sync + fmt::Debug {
    /// Printable form of the name.
    fn printable(&self) -> String;

    fn name_type(&self) -> &Oid;

    /// Mechanism that produced this element.
    fn mechanism(&self) -> &Oid;

    /// Mechanism name as seen by applications.
    fn to_principal(&self) -> PrincipalName {
        PrincipalName::mechanism_name(
            self.printable(),
            self.name_type().clone(),
            self.mechanism().clone(),
        )
    }
}

pub type NameRef = Arc<dyn NameElement>;

/// Mechanism-specific key material for one principal.
pub trait CredentialElement: Send + Sync + fmt::Debug {
    fn mechanism(&self) -> &Oid;

    fn name(&self) -> GssResult<NameRef>;

    /// Remaining lifetime for initiating contexts.
    fn init_lifetime(&self) -> Lifetime;

    /// Remaining lifetime for accepting contexts.
    fn accept_lifetime(&self) -> Lifetime;

    fn is_initiator(&self) -> bool;

    fn is_acceptor(&self) -> bool;

    /// Release the key material. Must tolerate repeated calls.
    fn dispose(&self);

    fn as_any(&self) -> &dyn Any;
}

pub type CredentialElementRef = Arc<dyn CredentialElement>;

/// Per-mechanism factory for names, credentials and contexts.
pub trait MechanismFactory: Send + Sync {
    fn mechanism(&self) -> &Oid;

    /// Native factories produce self-framed tokens and support
    /// interprocess context transfer.
    fn is_native(&self) -> bool {
        false
    }

    /// Name types this mechanism can import.
    fn name_types(&self) -> Vec<Oid>;

    fn name_element(&self, value: &str, name_type: &Oid) -> GssResult<NameRef>;

    /// Acquire a credential element. `name` of `None` asks for the default
    /// principal.
    fn credential_element(
        &self,
        name: Option<&NameRef>,
        init_lifetime: Lifetime,
        accept_lifetime: Lifetime,
        usage: CredentialUsage,
    ) -> GssResult<CredentialElementRef>;

    /// Engine for the initiating side. `credential` of `None` asks for the
    /// default initiator credential.
    fn initiator_context(
        &self,
        peer: &NameRef,
        credential: Option<CredentialElementRef>,
        lifetime: Lifetime,
    ) -> GssResult<Box<dyn MechanismContext>>;

    /// Engine for the accepting side.
    fn acceptor_context(
        &self,
        credential: Option<CredentialElementRef>,
    ) -> GssResult<Box<dyn MechanismContext>>;

    /// Rebuild an engine from an interprocess token, or `Ok(None)` if the
    /// token is not one of ours.
    fn import_context(&self, token: &[u8]) -> GssResult<Option<Box<dyn MechanismContext>>> {
        let _ = token;
        Ok(None)
    }
}

/// The mechanism engine a security context drives.
pub trait MechanismContext: Send + fmt::Debug {
    fn mechanism(&self) -> Oid;

    fn is_native(&self) -> bool {
        false
    }

    /// Characteristics requested by the application, applied once before
    /// the first step.
    fn request_flags(&mut self, flags: &RequestFlags) -> GssResult<()>;

    fn set_channel_binding(&mut self, binding: &ChannelBinding) -> GssResult<()>;

    /// Consume one inbound token (empty on the first initiator step) and
    /// produce the next outbound token, possibly empty.
    fn step(&mut self, input: &[u8]) -> GssResult<Vec<u8>>;

    fn is_established(&self) -> bool;

    /// Per-message protection may be available before establishment.
    fn is_protection_ready(&self) -> bool;

    fn is_transferable(&self) -> bool;

    fn is_initiator(&self) -> bool;

    /// Characteristics in effect: negotiated once established, requested
    /// before.
    fn flags(&self) -> RequestFlags;

    fn lifetime(&self) -> Lifetime;

    fn source_name(&self) -> Option<NameRef>;

    fn target_name(&self) -> Option<NameRef>;

    fn delegated_credential(&self) -> Option<CredentialElementRef> {
        None
    }

    /// Largest message that protects into at most `max_token_size` bytes.
    fn wrap_size_limit(&self, qop: u32, confidential: bool, max_token_size: usize)
        -> GssResult<usize>;

    fn protect(&mut self, message: &[u8], prop: &mut MessageProp) -> GssResult<Vec<u8>>;

    fn unprotect(&mut self, token: &[u8], prop: &mut MessageProp) -> GssResult<Vec<u8>>;

    fn sign(&mut self, message: &[u8], prop: &mut MessageProp) -> GssResult<Vec<u8>>;

    fn verify(&mut self, token: &[u8], message: &[u8], prop: &mut MessageProp) -> GssResult<()>;

    /// Serialize the context for another process; the engine is unusable
    /// afterwards.
    fn export(&mut self) -> GssResult<Vec<u8>> {
        Err(GssError::failure("context export not supported"))
    }

    fn inquire(&self, kind: InquireType) -> GssResult<InquireValue> {
        Err(GssError::failure(format!("{kind:?} inquiry not supported")))
    }

    fn dispose(&mut self);
}

/// Source of manager configuration.
pub trait ConfigProvider {
    fn manager_config(&self) -> ManagerConfig;
}

impl ConfigProvider for ManagerConfig {
    fn manager_config(&self) -> ManagerConfig {
        self.clone()
    }
}
