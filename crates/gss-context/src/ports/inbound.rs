//! # Inbound Port - SecurityManagerApi
//!
//! The application-facing manager: names, credentials and contexts over
//! one registry of mechanism providers.

use crate::domain::{Credential, ProviderHandle, SecurityContext};
use gss_types::{CredentialUsage, GssResult, Lifetime, Oid, PrincipalName};
use std::sync::Arc;

/// Primary API of the negotiation core.
///
/// # Example
///
/// ```rust,ignore
/// use gss_context::{SecurityManager, SecurityManagerApi, ManagerConfig};
///
/// let manager = SecurityManager::with_providers(ManagerConfig::from_env(), providers);
/// let service = manager.create_name("HTTP@server", Oid::NT_HOSTBASED_SERVICE);
/// let mut context = manager.create_initiator_context(service, None, None, Lifetime::DEFAULT);
/// let token = context.initiate(&[])?;
/// ```
pub trait SecurityManagerApi: Send + Sync {
    /// Every mechanism some registered provider declares.
    fn mechanisms(&self) -> Vec<Oid>;

    /// Name types the mechanism's factory can import.
    ///
    /// # Errors
    /// - `UnsupportedMechanism`: no provider declares `mechanism`
    fn names_for_mechanism(&self, mechanism: &Oid) -> GssResult<Vec<Oid>>;

    /// Mechanisms able to import `name_type`.
    fn mechanisms_for_name(&self, name_type: &Oid) -> Vec<Oid>;

    fn create_name(&self, value: &str, name_type: Oid) -> PrincipalName;

    /// Mechanism name for `name` under `mechanism`.
    fn canonicalize(&self, name: &PrincipalName, mechanism: &Oid) -> GssResult<PrincipalName>;

    /// Empty credential that elements are added to later.
    fn create_credential(&self, usage: CredentialUsage) -> Arc<Credential>;

    /// Acquire across `mechanisms`, or best-effort across every known
    /// mechanism when `None`.
    ///
    /// # Errors
    /// - `NoCredential`: nothing acquired, or the aggregate usage differs
    fn acquire_credential(
        &self,
        name: Option<&PrincipalName>,
        lifetime: Lifetime,
        mechanisms: Option<&[Oid]>,
        usage: CredentialUsage,
    ) -> GssResult<Arc<Credential>>;

    /// Acquire for a single mechanism, the default one when `None`.
    fn acquire_credential_for(
        &self,
        name: Option<&PrincipalName>,
        lifetime: Lifetime,
        mechanism: Option<&Oid>,
        usage: CredentialUsage,
    ) -> GssResult<Arc<Credential>>;

    fn create_initiator_context(
        &self,
        peer: PrincipalName,
        mechanism: Option<Oid>,
        credential: Option<Arc<Credential>>,
        lifetime: Lifetime,
    ) -> SecurityContext;

    fn create_acceptor_context(&self, credential: Option<Arc<Credential>>) -> SecurityContext;

    /// Rebuild a context exported by another process.
    fn import_context(&self, token: &[u8]) -> GssResult<SecurityContext>;

    fn add_provider_at_front(
        &self,
        provider: ProviderHandle,
        mechanism: Option<Oid>,
    ) -> GssResult<()>;

    fn add_provider_at_end(&self, provider: ProviderHandle, mechanism: Option<Oid>)
        -> GssResult<()>;
}
