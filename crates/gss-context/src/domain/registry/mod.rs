//! # Mechanism Registry
//!
//! Resolves a mechanism identifier to a [`MechanismFactory`] by walking an
//! ordered list of provider preferences.
//!
//! ## Preference entries
//!
//! Each entry names a provider and either one mechanism (explicit) or
//! every mechanism the provider declares (wildcard). During resolution a
//! wildcard entry whose provider lacks the mechanism is skipped; an explicit
//! entry that fails is an error, since the application asked for that
//! provider by name.
//!
//! Entry A *implies* entry B when they are equal, or when both name the same
//! provider and A is a wildcard. Registration uses implication to keep the
//! list free of redundant entries.
//!
//! ## Locking
//!
//! One mutex guards the preference list, the factory cache and the set of
//! known mechanisms. Registration is rare, so the coarse lock is held for
//! whole operations, including factory construction.

use crate::domain::ManagerConfig;
use crate::ports::MechanismFactory;
use gss_telemetry::{metric_inc, MECHANISM_RESOLUTIONS};
use gss_types::{GssError, GssResult, Oid};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Builds the factory for one mechanism of a provider.
pub type FactoryConstructor =
    Arc<dyn Fn(&Oid) -> GssResult<Arc<dyn MechanismFactory>> + Send + Sync>;

// =============================================================================
// PROVIDER
// =============================================================================

/// A named bundle of mechanism factory constructors.
///
/// Providers are registered ahead of time; nothing is looked up by name at
/// resolution time beyond the constructors declared here.
pub struct Provider {
    name: String,
    native: bool,
    factories: Vec<(Oid, FactoryConstructor)>,
}

pub type ProviderHandle = Arc<Provider>;

impl Provider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            native: false,
            factories: Vec::new(),
        }
    }

    /// A provider backed by the platform's own implementation.
    pub fn native(name: impl Into<String>) -> Self {
        Self {
            native: true,
            ..Self::new(name)
        }
    }

    /// Declare support for `mechanism`, built by `constructor`.
    pub fn with_factory<F>(mut self, mechanism: Oid, constructor: F) -> Self
    where
        F: Fn(&Oid) -> GssResult<Arc<dyn MechanismFactory>> + Send + Sync + 'static,
    {
        self.factories.retain(|(oid, _)| oid != &mechanism);
        self.factories.push((mechanism, Arc::new(constructor)));
        self
    }

    pub fn into_handle(self) -> ProviderHandle {
        Arc::new(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_native(&self) -> bool {
        self.native
    }

    pub fn declares(&self, mechanism: &Oid) -> bool {
        self.factories.iter().any(|(oid, _)| oid == mechanism)
    }

    /// Declared mechanisms in declaration order.
    pub fn mechanisms(&self) -> Vec<Oid> {
        self.factories.iter().map(|(oid, _)| oid.clone()).collect()
    }

    fn instantiate(&self, mechanism: &Oid) -> GssResult<Arc<dyn MechanismFactory>> {
        let (_, constructor) = self
            .factories
            .iter()
            .find(|(oid, _)| oid == mechanism)
            .ok_or_else(|| GssError::UnsupportedMechanism {
                mechanism: mechanism.clone(),
                provider: Some(self.name.clone()),
            })?;
        constructor(mechanism)
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("name", &self.name)
            .field("native", &self.native)
            .field("mechanisms", &self.mechanisms())
            .finish()
    }
}

impl PartialEq for Provider {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Provider {}

// =============================================================================
// PREFERENCES
// =============================================================================

#[derive(Debug, Clone)]
struct PreferenceEntry {
    provider: ProviderHandle,
    mechanism: Option<Oid>,
}

impl PreferenceEntry {
    fn new(provider: ProviderHandle, mechanism: Option<Oid>) -> Self {
        Self {
            provider,
            mechanism,
        }
    }

    fn same_provider(&self, other: &PreferenceEntry) -> bool {
        self.provider.name() == other.provider.name()
    }

    fn implies(&self, other: &PreferenceEntry) -> bool {
        if !self.same_provider(other) {
            return false;
        }
        self.mechanism.is_none() || self.mechanism == other.mechanism
    }

    fn implies_mechanism(&self, mechanism: &Oid) -> bool {
        self.mechanism.as_ref().map_or(true, |m| m == mechanism)
    }
}

/// A factory together with the provider that supplied it.
#[derive(Clone)]
pub struct ResolvedFactory {
    pub provider: ProviderHandle,
    pub factory: Arc<dyn MechanismFactory>,
}

impl fmt::Debug for ResolvedFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedFactory")
            .field("provider", &self.provider.name())
            .field("mechanism", self.factory.mechanism())
            .finish()
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

#[derive(Default)]
struct RegistryState {
    preferences: Vec<PreferenceEntry>,
    cache: HashMap<(String, Oid), Arc<dyn MechanismFactory>>,
    known: Vec<Oid>,
}

impl RegistryState {
    fn remember(&mut self, mechanism: Oid) {
        if !self.known.contains(&mechanism) {
            self.known.push(mechanism);
        }
    }

    /// Record the mechanisms `entry` makes available. Returns whether any
    /// were found.
    fn record_mechanisms(&mut self, entry: &PreferenceEntry) -> bool {
        match &entry.mechanism {
            Some(mechanism) => {
                self.remember(mechanism.clone());
                true
            }
            None => {
                let declared = entry.provider.mechanisms();
                let found = !declared.is_empty();
                for mechanism in declared {
                    self.remember(mechanism);
                }
                found
            }
        }
    }

    /// Factory for `mechanism` from `entry`'s provider.
    ///
    /// `Ok(None)` means a wildcard entry whose provider does not declare the
    /// mechanism; the caller moves on.
    fn factory_for(
        &mut self,
        entry: &PreferenceEntry,
        mechanism: &Oid,
    ) -> GssResult<Option<Arc<dyn MechanismFactory>>> {
        let key = (entry.provider.name().to_string(), mechanism.clone());
        if let Some(factory) = self.cache.get(&key) {
            metric_inc!(MECHANISM_RESOLUTIONS, &["cached"]);
            return Ok(Some(Arc::clone(factory)));
        }

        if entry.mechanism.is_none() && !entry.provider.declares(mechanism) {
            debug!(
                provider = entry.provider.name(),
                mechanism = %mechanism,
                "[Registry] Wildcard provider lacks mechanism, trying next"
            );
            return Ok(None);
        }

        match entry.provider.instantiate(mechanism) {
            Ok(factory) => {
                metric_inc!(MECHANISM_RESOLUTIONS, &["created"]);
                debug!(
                    provider = entry.provider.name(),
                    mechanism = %mechanism,
                    "[Registry] Instantiated mechanism factory"
                );
                self.cache.insert(key, Arc::clone(&factory));
                Ok(Some(factory))
            }
            Err(e) => {
                let outcome = if e.is(gss_types::ErrorKind::UnsupportedMechanism) {
                    "unsupported"
                } else {
                    "failed"
                };
                metric_inc!(MECHANISM_RESOLUTIONS, &[outcome]);
                warn!(
                    provider = entry.provider.name(),
                    mechanism = %mechanism,
                    error = %e,
                    "[Registry] Explicit provider could not supply mechanism"
                );
                Err(e)
            }
        }
    }
}

/// Preference-ordered mechanism lookup shared by a manager and everything
/// it creates.
pub struct MechanismRegistry {
    default_mechanism: Oid,
    state: Mutex<RegistryState>,
}

impl MechanismRegistry {
    pub fn new(config: &ManagerConfig) -> Self {
        Self {
            default_mechanism: config.default_mechanism.clone(),
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Mechanism used when callers omit one.
    pub fn default_mechanism(&self) -> &Oid {
        &self.default_mechanism
    }

    /// Resolve `mechanism` (or the default) to a factory.
    ///
    /// With `provider` set, only that provider is consulted, as if it had an
    /// explicit preference entry for the mechanism.
    pub fn resolve(
        &self,
        mechanism: Option<&Oid>,
        provider: Option<&ProviderHandle>,
    ) -> GssResult<ResolvedFactory> {
        let mechanism = mechanism.unwrap_or(&self.default_mechanism);
        let mut state = self.state.lock();

        if let Some(provider) = provider {
            let entry = PreferenceEntry::new(Arc::clone(provider), Some(mechanism.clone()));
            return match state.factory_for(&entry, mechanism)? {
                Some(factory) => Ok(ResolvedFactory {
                    provider: entry.provider,
                    factory,
                }),
                None => Err(GssError::UnsupportedMechanism {
                    mechanism: mechanism.clone(),
                    provider: Some(provider.name().to_string()),
                }),
            };
        }

        let candidates: Vec<PreferenceEntry> = state
            .preferences
            .iter()
            .filter(|entry| entry.implies_mechanism(mechanism))
            .cloned()
            .collect();
        for entry in candidates {
            if let Some(factory) = state.factory_for(&entry, mechanism)? {
                return Ok(ResolvedFactory {
                    provider: entry.provider,
                    factory,
                });
            }
        }

        metric_inc!(MECHANISM_RESOLUTIONS, &["unsupported"]);
        debug!(mechanism = %mechanism, "[Registry] No provider supports mechanism");
        Err(GssError::unsupported(mechanism))
    }

    /// Give `provider` top preference for `mechanism`, or for everything it
    /// declares when `mechanism` is `None`.
    ///
    /// Entries made redundant by the new one are removed first. A wildcard
    /// for a provider declaring nothing is not inserted.
    pub fn add_provider_at_front(
        &self,
        provider: ProviderHandle,
        mechanism: Option<Oid>,
    ) -> GssResult<()> {
        check_declared(&provider, mechanism.as_ref())?;
        let entry = PreferenceEntry::new(provider, mechanism);

        let mut state = self.state.lock();
        state.preferences.retain(|old| !entry.implies(old));
        if state.record_mechanisms(&entry) {
            info!(
                provider = entry.provider.name(),
                mechanism = ?entry.mechanism,
                "[Registry] Provider added at front"
            );
            state.preferences.insert(0, entry);
        }
        Ok(())
    }

    /// Give `provider` lowest preference for `mechanism`, or for everything
    /// it declares when `mechanism` is `None`.
    ///
    /// A no-op when an existing entry already implies the new one.
    pub fn add_provider_at_end(
        &self,
        provider: ProviderHandle,
        mechanism: Option<Oid>,
    ) -> GssResult<()> {
        let entry = PreferenceEntry::new(provider, mechanism);

        let mut state = self.state.lock();
        if state.preferences.iter().any(|old| old.implies(&entry)) {
            debug!(
                provider = entry.provider.name(),
                mechanism = ?entry.mechanism,
                "[Registry] Provider already implied, not re-added"
            );
            return Ok(());
        }
        check_declared(&entry.provider, entry.mechanism.as_ref())?;
        if state.record_mechanisms(&entry) {
            info!(
                provider = entry.provider.name(),
                mechanism = ?entry.mechanism,
                "[Registry] Provider added at end"
            );
            state.preferences.push(entry);
        }
        Ok(())
    }

    /// Every mechanism some registered provider declares, in registration
    /// order.
    pub fn known_mechanisms(&self) -> Vec<Oid> {
        self.state.lock().known.clone()
    }

    pub fn is_known(&self, mechanism: &Oid) -> bool {
        self.state.lock().known.contains(mechanism)
    }

    /// Current preference list as `(provider name, mechanism)` pairs.
    pub fn preferences(&self) -> Vec<(String, Option<Oid>)> {
        self.state
            .lock()
            .preferences
            .iter()
            .map(|e| (e.provider.name().to_string(), e.mechanism.clone()))
            .collect()
    }
}

impl fmt::Debug for MechanismRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MechanismRegistry")
            .field("default_mechanism", &self.default_mechanism)
            .field("preferences", &self.preferences())
            .finish()
    }
}

fn check_declared(provider: &Provider, mechanism: Option<&Oid>) -> GssResult<()> {
    match mechanism {
        Some(mechanism) if !provider.declares(mechanism) => Err(GssError::UnsupportedMechanism {
            mechanism: mechanism.clone(),
            provider: Some(provider.name().to_string()),
        }),
        _ => Ok(()),
    }
}
