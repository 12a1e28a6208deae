//! # Credential Store
//!
//! A principal's credentials across mechanisms: one opaque element per
//! `(mechanism, usage)` key.
//!
//! When `InitiateAndAccept` is asked for and the mechanism hands back a
//! single-direction element, a second element is acquired for the other
//! direction and both are stored under their own keys. Lookups index by
//! exact usage, so this split keeps them simple.
//!
//! Aggregate attributes (usage, lifetimes, mechanism list) are computed on
//! each call since elements expire independently.

use crate::domain::{MechanismRegistry, ProviderHandle};
use crate::ports::{CredentialElementRef, NameRef};
use gss_telemetry::{metric_inc, CREDENTIALS_ACQUIRED};
use gss_types::{CredentialUsage, GssError, GssResult, Lifetime, Oid, PrincipalName};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One stored element together with the provider that produced it.
#[derive(Debug, Clone)]
pub struct CredentialSlot {
    pub mechanism: Oid,
    pub usage: CredentialUsage,
    pub element: CredentialElementRef,
    pub provider: ProviderHandle,
}

impl CredentialSlot {
    fn matches(&self, mechanism: &Oid, usage: CredentialUsage) -> bool {
        &self.mechanism == mechanism && self.usage == usage
    }

    /// Lifetime relevant to this slot's usage.
    fn lifetime(&self) -> Lifetime {
        match self.usage {
            CredentialUsage::InitiateOnly => self.element.init_lifetime(),
            CredentialUsage::AcceptOnly => self.element.accept_lifetime(),
            CredentialUsage::InitiateAndAccept => self
                .element
                .init_lifetime()
                .min(self.element.accept_lifetime()),
        }
    }

    fn can(&self, initiate: bool) -> bool {
        if initiate {
            self.element.is_initiator()
        } else {
            self.element.is_acceptor()
        }
    }
}

#[derive(Default)]
struct CredentialState {
    slots: Vec<CredentialSlot>,
    destroyed: bool,
}

impl CredentialState {
    fn find(&self, mechanism: &Oid, usage: CredentialUsage) -> Option<&CredentialSlot> {
        self.slots.iter().find(|s| s.matches(mechanism, usage))
    }

    fn contains(&self, mechanism: &Oid, usage: CredentialUsage) -> bool {
        self.find(mechanism, usage).is_some()
    }

    /// Exact usage first, then the combined entry.
    fn find_directional(&self, mechanism: &Oid, initiate: bool) -> Option<&CredentialSlot> {
        self.find(mechanism, CredentialUsage::single(initiate))
            .or_else(|| self.find(mechanism, CredentialUsage::InitiateAndAccept))
    }
}

/// Mechanism-independent credential handle.
///
/// Shared as `Arc<Credential>`. Reads take a shared lock; adding elements
/// and disposal take it exclusively.
pub struct Credential {
    registry: Arc<MechanismRegistry>,
    intent: CredentialUsage,
    state: RwLock<CredentialState>,
}

impl Credential {
    /// Empty credential; elements are added later.
    pub fn new(registry: Arc<MechanismRegistry>, usage: CredentialUsage) -> Self {
        Self {
            registry,
            intent: usage,
            state: RwLock::new(CredentialState::default()),
        }
    }

    /// Acquire elements for `mechanisms`, or best-effort for every known
    /// mechanism when `None`.
    ///
    /// Per-mechanism failures are only tolerated for the default list. The
    /// result must hold something and its aggregate usage must equal
    /// `usage`.
    pub fn acquire(
        registry: Arc<MechanismRegistry>,
        name: Option<&PrincipalName>,
        lifetime: Lifetime,
        mechanisms: Option<&[Oid]>,
        usage: CredentialUsage,
    ) -> GssResult<Self> {
        let (mechanisms, default_list) = match mechanisms {
            Some(list) => (list.to_vec(), false),
            None => (registry.known_mechanisms(), true),
        };

        let credential = Self::new(registry, usage);
        let mut failures = Vec::new();
        for mechanism in &mechanisms {
            match credential.add_element(name, lifetime, lifetime, Some(mechanism), usage) {
                Ok(()) => {}
                Err(e) if default_list => {
                    debug!(
                        mechanism = %mechanism,
                        error = %e,
                        "[Credential] Skipping mechanism during default acquisition"
                    );
                    failures.push((mechanism.clone(), e));
                }
                Err(e) => return Err(e),
            }
        }

        let state = credential.state.read();
        if state.slots.is_empty() {
            warn!(
                attempted = mechanisms.len(),
                failed = failures.len(),
                "[Credential] No credential element could be acquired"
            );
            return Err(GssError::no_credential(None, Some(usage)));
        }
        let acquired = aggregate_usage(&state.slots);
        drop(state);
        if acquired != Some(usage) {
            return Err(GssError::no_credential(None, Some(usage)));
        }
        Ok(credential)
    }

    /// Wrap a single element, e.g. a delegated credential.
    pub fn from_element(
        registry: Arc<MechanismRegistry>,
        provider: ProviderHandle,
        element: CredentialElementRef,
    ) -> GssResult<Self> {
        let Some(usage) =
            CredentialUsage::from_capabilities(element.is_initiator(), element.is_acceptor())
        else {
            return Err(GssError::failure("credential element supports neither direction"));
        };
        let slot = CredentialSlot {
            mechanism: element.mechanism().clone(),
            usage,
            element,
            provider,
        };
        Ok(Self {
            registry,
            intent: usage,
            state: RwLock::new(CredentialState {
                slots: vec![slot],
                destroyed: false,
            }),
        })
    }

    /// Acquire one element for `mechanism` (default when `None`).
    ///
    /// A single-direction element returned for `InitiateAndAccept` triggers
    /// a second acquisition for the other direction.
    pub fn add_element(
        &self,
        name: Option<&PrincipalName>,
        init_lifetime: Lifetime,
        accept_lifetime: Lifetime,
        mechanism: Option<&Oid>,
        usage: CredentialUsage,
    ) -> GssResult<()> {
        let mechanism = mechanism
            .unwrap_or_else(|| self.registry.default_mechanism())
            .clone();

        let mut state = self.state.write();
        ensure_valid(&state)?;
        if state.contains(&mechanism, usage) {
            return Err(GssError::DuplicateRegistration { mechanism, usage });
        }

        let resolved = self.registry.resolve(Some(&mechanism), None)?;
        let name_element: Option<NameRef> = name
            .map(|n| resolved.factory.name_element(n.value(), n.name_type()))
            .transpose()?;

        let element = acquire_element(
            &resolved.factory,
            name_element.as_ref(),
            init_lifetime,
            accept_lifetime,
            usage,
        )?;

        let single = usage == CredentialUsage::InitiateAndAccept
            && !(element.is_initiator() && element.is_acceptor());
        let acquired = if single {
            let current = CredentialUsage::single(element.is_initiator());
            let desired = CredentialUsage::single(!element.is_initiator());
            let complement = acquire_element(
                &resolved.factory,
                name_element.as_ref(),
                init_lifetime,
                accept_lifetime,
                desired,
            )
            .inspect_err(|_| element.dispose())?;
            vec![(current, element), (desired, complement)]
        } else {
            // Keyed by what the element can actually do
            let Some(actual) =
                CredentialUsage::from_capabilities(element.is_initiator(), element.is_acceptor())
            else {
                element.dispose();
                return Err(GssError::no_credential(Some(&mechanism), Some(usage)));
            };
            vec![(actual, element)]
        };

        if let Some((taken, _)) = acquired
            .iter()
            .find(|(key, _)| state.contains(&mechanism, *key))
        {
            let taken = *taken;
            for (_, element) in &acquired {
                element.dispose();
            }
            return Err(GssError::DuplicateRegistration {
                mechanism,
                usage: taken,
            });
        }

        let split = acquired.len() > 1;
        for (key, element) in acquired {
            state.slots.push(CredentialSlot {
                mechanism: mechanism.clone(),
                usage: key,
                element,
                provider: Arc::clone(&resolved.provider),
            });
        }
        if split {
            info!(
                mechanism = %mechanism,
                "[Credential] Single-direction element split into initiate and accept entries"
            );
        } else {
            info!(mechanism = %mechanism, usage = %usage, "[Credential] Element added");
        }
        Ok(())
    }

    /// Element for `mechanism` usable in the given direction.
    ///
    /// Without a mechanism the default mechanism is tried first, then any
    /// element able to act in that direction.
    pub fn element(&self, mechanism: Option<&Oid>, initiate: bool) -> GssResult<CredentialSlot> {
        let state = self.state.read();
        ensure_valid(&state)?;

        let found = match mechanism {
            Some(mechanism) => state.find_directional(mechanism, initiate),
            None => state
                .find_directional(self.registry.default_mechanism(), initiate)
                .or_else(|| state.slots.iter().find(|s| s.can(initiate))),
        };
        found.cloned().ok_or_else(|| {
            GssError::no_credential(mechanism, Some(CredentialUsage::single(initiate)))
        })
    }

    /// Usage across all elements.
    pub fn usage(&self) -> GssResult<CredentialUsage> {
        let state = self.state.read();
        ensure_valid(&state)?;
        Ok(aggregate_usage(&state.slots).unwrap_or(self.intent))
    }

    /// Usage available for one mechanism.
    pub fn usage_for(&self, mechanism: &Oid) -> GssResult<CredentialUsage> {
        let state = self.state.read();
        ensure_valid(&state)?;

        let combined = state.contains(mechanism, CredentialUsage::InitiateAndAccept);
        let initiate = combined || state.contains(mechanism, CredentialUsage::InitiateOnly);
        let accept = combined || state.contains(mechanism, CredentialUsage::AcceptOnly);
        CredentialUsage::from_capabilities(initiate, accept)
            .ok_or_else(|| GssError::no_credential(Some(mechanism), None))
    }

    /// Principal behind the element for `mechanism`, or behind the first
    /// element when `None`.
    pub fn name(&self, mechanism: Option<&Oid>) -> GssResult<PrincipalName> {
        let state = self.state.read();
        ensure_valid(&state)?;

        let slot = match mechanism {
            Some(mechanism) => [
                CredentialUsage::InitiateOnly,
                CredentialUsage::AcceptOnly,
                CredentialUsage::InitiateAndAccept,
            ]
            .into_iter()
            .find_map(|usage| state.find(mechanism, usage)),
            None => state.slots.first(),
        };
        let slot = slot.ok_or_else(|| GssError::no_credential(mechanism, None))?;
        Ok(slot.element.name()?.to_principal())
    }

    /// Shortest remaining lifetime across elements; indefinite when empty.
    pub fn remaining_lifetime(&self) -> GssResult<Lifetime> {
        let state = self.state.read();
        ensure_valid(&state)?;
        Ok(state
            .slots
            .iter()
            .map(CredentialSlot::lifetime)
            .min()
            .unwrap_or(Lifetime::INDEFINITE))
    }

    /// Longest initiator lifetime among entries for `mechanism`.
    pub fn remaining_init_lifetime(&self, mechanism: &Oid) -> GssResult<Lifetime> {
        self.directional_lifetime(mechanism, true)
    }

    /// Longest acceptor lifetime among entries for `mechanism`.
    pub fn remaining_accept_lifetime(&self, mechanism: &Oid) -> GssResult<Lifetime> {
        self.directional_lifetime(mechanism, false)
    }

    fn directional_lifetime(&self, mechanism: &Oid, initiate: bool) -> GssResult<Lifetime> {
        let state = self.state.read();
        ensure_valid(&state)?;

        [CredentialUsage::single(initiate), CredentialUsage::InitiateAndAccept]
            .into_iter()
            .filter_map(|usage| state.find(mechanism, usage))
            .map(|slot| {
                if initiate {
                    slot.element.init_lifetime()
                } else {
                    slot.element.accept_lifetime()
                }
            })
            .max()
            .ok_or_else(|| {
                GssError::no_credential(Some(mechanism), Some(CredentialUsage::single(initiate)))
            })
    }

    /// Mechanisms with at least one element, without duplicates.
    pub fn mechanisms(&self) -> GssResult<Vec<Oid>> {
        let state = self.state.read();
        ensure_valid(&state)?;

        let mut mechanisms: Vec<Oid> = Vec::with_capacity(state.slots.len());
        for slot in &state.slots {
            if !mechanisms.contains(&slot.mechanism) {
                mechanisms.push(slot.mechanism.clone());
            }
        }
        Ok(mechanisms)
    }

    pub fn element_count(&self) -> usize {
        self.state.read().slots.len()
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.read().destroyed
    }

    /// Dispose every element and invalidate the credential. Idempotent.
    pub fn dispose(&self) {
        let mut state = self.state.write();
        if state.destroyed {
            return;
        }
        for slot in state.slots.drain(..) {
            slot.element.dispose();
        }
        state.destroyed = true;
        debug!("[Credential] Disposed");
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        let keys: Vec<(String, CredentialUsage)> = state
            .slots
            .iter()
            .map(|s| (s.mechanism.to_string(), s.usage))
            .collect();
        f.debug_struct("Credential")
            .field("intent", &self.intent)
            .field("elements", &keys)
            .field("destroyed", &state.destroyed)
            .finish()
    }
}

fn ensure_valid(state: &CredentialState) -> GssResult<()> {
    if state.destroyed {
        return Err(GssError::invalid_state("credential is no longer valid"));
    }
    Ok(())
}

fn acquire_element(
    factory: &Arc<dyn crate::ports::MechanismFactory>,
    name: Option<&NameRef>,
    init_lifetime: Lifetime,
    accept_lifetime: Lifetime,
    usage: CredentialUsage,
) -> GssResult<CredentialElementRef> {
    match factory.credential_element(name, init_lifetime, accept_lifetime, usage) {
        Ok(element) => {
            metric_inc!(CREDENTIALS_ACQUIRED, &["success"]);
            Ok(element)
        }
        Err(e) => {
            metric_inc!(CREDENTIALS_ACQUIRED, &["failure"]);
            Err(e)
        }
    }
}

/// `InitiateAndAccept` if any entry is combined or both single directions
/// are present; `None` for no entries.
fn aggregate_usage(slots: &[CredentialSlot]) -> Option<CredentialUsage> {
    let mut initiate = false;
    let mut accept = false;
    for slot in slots {
        match slot.usage {
            CredentialUsage::InitiateAndAccept => return Some(CredentialUsage::InitiateAndAccept),
            CredentialUsage::InitiateOnly => initiate = true,
            CredentialUsage::AcceptOnly => accept = true,
        }
    }
    CredentialUsage::from_capabilities(initiate, accept)
}
