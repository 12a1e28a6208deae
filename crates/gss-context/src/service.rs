//! # Security Manager Service
//!
//! Application service implementing [`SecurityManagerApi`]. It owns the
//! mechanism registry and hands it to every credential and context it
//! creates.

use crate::domain::{Credential, ManagerConfig, MechanismRegistry, ProviderHandle, SecurityContext};
use crate::ports::{ConfigProvider, SecurityManagerApi};
use gss_types::{CredentialUsage, GssResult, Lifetime, Oid, PrincipalName};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The application-visible manager instance.
pub struct SecurityManager {
    config: ManagerConfig,
    registry: Arc<MechanismRegistry>,
}

impl SecurityManager {
    /// Manager without providers.
    pub fn new(config: ManagerConfig) -> Self {
        let registry = Arc::new(MechanismRegistry::new(&config));
        Self { config, registry }
    }

    /// Manager with `providers` registered at the end in order.
    ///
    /// Providers that fail to register are logged and skipped. With
    /// `use_native` only native providers are admitted.
    pub fn with_providers(
        config: ManagerConfig,
        providers: impl IntoIterator<Item = ProviderHandle>,
    ) -> Self {
        let manager = Self::new(config);
        for provider in providers {
            if manager.config.use_native && !provider.is_native() {
                debug!(provider = provider.name(), "[Manager] Skipping non-native provider");
                continue;
            }
            let name = provider.name().to_string();
            if let Err(e) = manager.registry.add_provider_at_end(provider, None) {
                warn!(provider = %name, error = %e, "[Manager] Provider registration failed");
            }
        }
        info!(
            default_mechanism = %manager.config.default_mechanism,
            mechanisms = manager.registry.known_mechanisms().len(),
            "[Manager] Ready"
        );
        manager
    }

    /// Manager configured from any [`ConfigProvider`].
    pub fn from_config(
        source: &impl ConfigProvider,
        providers: impl IntoIterator<Item = ProviderHandle>,
    ) -> Self {
        Self::with_providers(source.manager_config(), providers)
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<MechanismRegistry> {
        &self.registry
    }
}

impl SecurityManagerApi for SecurityManager {
    fn mechanisms(&self) -> Vec<Oid> {
        self.registry.known_mechanisms()
    }

    fn names_for_mechanism(&self, mechanism: &Oid) -> GssResult<Vec<Oid>> {
        let resolved = self.registry.resolve(Some(mechanism), None)?;
        Ok(resolved.factory.name_types())
    }

    fn mechanisms_for_name(&self, name_type: &Oid) -> Vec<Oid> {
        let name_type = if name_type == &Oid::NT_HOSTBASED_SERVICE_X {
            &Oid::NT_HOSTBASED_SERVICE
        } else {
            name_type
        };

        self.registry
            .known_mechanisms()
            .into_iter()
            .filter(|mechanism| match self.names_for_mechanism(mechanism) {
                Ok(types) => types.contains(name_type),
                Err(e) => {
                    debug!(mechanism = %mechanism, error = %e, "[Manager] Skipping mechanism");
                    false
                }
            })
            .collect()
    }

    fn create_name(&self, value: &str, name_type: Oid) -> PrincipalName {
        PrincipalName::new(value, name_type)
    }

    fn canonicalize(&self, name: &PrincipalName, mechanism: &Oid) -> GssResult<PrincipalName> {
        let resolved = self.registry.resolve(Some(mechanism), None)?;
        let element = resolved
            .factory
            .name_element(name.value(), name.name_type())?;
        Ok(element.to_principal())
    }

    fn create_credential(&self, usage: CredentialUsage) -> Arc<Credential> {
        Arc::new(Credential::new(Arc::clone(&self.registry), usage))
    }

    fn acquire_credential(
        &self,
        name: Option<&PrincipalName>,
        lifetime: Lifetime,
        mechanisms: Option<&[Oid]>,
        usage: CredentialUsage,
    ) -> GssResult<Arc<Credential>> {
        let credential =
            Credential::acquire(Arc::clone(&self.registry), name, lifetime, mechanisms, usage)?;
        Ok(Arc::new(credential))
    }

    fn acquire_credential_for(
        &self,
        name: Option<&PrincipalName>,
        lifetime: Lifetime,
        mechanism: Option<&Oid>,
        usage: CredentialUsage,
    ) -> GssResult<Arc<Credential>> {
        let mechanism = mechanism.unwrap_or(&self.config.default_mechanism).clone();
        self.acquire_credential(name, lifetime, Some(&[mechanism]), usage)
    }

    fn create_initiator_context(
        &self,
        peer: PrincipalName,
        mechanism: Option<Oid>,
        credential: Option<Arc<Credential>>,
        lifetime: Lifetime,
    ) -> SecurityContext {
        SecurityContext::initiator(
            Arc::clone(&self.registry),
            peer,
            mechanism,
            credential,
            lifetime,
        )
    }

    fn create_acceptor_context(&self, credential: Option<Arc<Credential>>) -> SecurityContext {
        SecurityContext::acceptor(Arc::clone(&self.registry), credential)
    }

    fn import_context(&self, token: &[u8]) -> GssResult<SecurityContext> {
        SecurityContext::import(Arc::clone(&self.registry), token)
    }

    fn add_provider_at_front(
        &self,
        provider: ProviderHandle,
        mechanism: Option<Oid>,
    ) -> GssResult<()> {
        self.registry.add_provider_at_front(provider, mechanism)
    }

    fn add_provider_at_end(
        &self,
        provider: ProviderHandle,
        mechanism: Option<Oid>,
    ) -> GssResult<()> {
        self.registry.add_provider_at_end(provider, mechanism)
    }
}
