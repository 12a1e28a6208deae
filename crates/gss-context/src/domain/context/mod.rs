//! # Security Context
//!
//! The mechanism-independent context lifecycle.
//!
//! ```text
//! PreInit ──initiate/accept──> InProgress ──engine established──> Ready
//!    │                             │                                │
//!    └─────────────────────────────┴──────────── dispose ───────────┴──> Deleted
//! ```
//!
//! The first `initiate` picks a credential element, resolves the mechanism
//! factory and builds the engine; the first `accept` discovers the
//! mechanism from the inbound token header. Every later token is checked
//! against the mechanism fixed at that point.
//!
//! ## Header exemption
//!
//! Tokens are framed with a [`TokenHeader`] except when the engine is
//! native (it frames its own tokens) or the mechanism is SPNEGO and the
//! token is anything but the initiator's first.
//!
//! A failed first step releases the engine, so the context is back at
//! `PreInit` with no engine and the next call starts over.
//!
//! ## Threading
//!
//! A context belongs to one peer relationship. Methods that advance it
//! take `&mut self`; share it across threads behind a lock of your own.

use crate::domain::{Credential, CredentialSlot, MechanismRegistry, ProviderHandle, TokenHeader};
use crate::ports::{CredentialElementRef, MechanismContext, NameRef};
use gss_telemetry::{
    metric_inc, metric_observe, CONTEXTS_CREATED, CONTEXTS_ESTABLISHED, HANDSHAKE_STEP_DURATION,
    SEQUENCE_ANOMALIES, TOKENS_REJECTED,
};
use gss_types::{
    ChannelBinding, ErrorKind, GssError, GssResult, InquireType, InquireValue, Lifetime,
    MessageProp, Oid, PrincipalName, RequestFlags, SupplementaryStatus,
};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle state of a [`SecurityContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    PreInit,
    InProgress,
    Ready,
    Deleted,
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContextState::PreInit => "pre-init",
            ContextState::InProgress => "in-progress",
            ContextState::Ready => "ready",
            ContextState::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextRole {
    Initiator,
    Acceptor,
}

impl ContextRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ContextRole::Initiator => "initiator",
            ContextRole::Acceptor => "acceptor",
        }
    }
}

/// One side of a security context.
pub struct SecurityContext {
    id: Uuid,
    registry: Arc<MechanismRegistry>,
    role: ContextRole,
    state: ContextState,
    /// Requested by the initiator, discovered by the acceptor.
    mechanism: Option<Oid>,
    peer: Option<PrincipalName>,
    credential: Option<Arc<Credential>>,
    lifetime: Lifetime,
    flags: RequestFlags,
    channel_binding: Option<ChannelBinding>,
    engine: Option<Box<dyn MechanismContext>>,
    provider: Option<ProviderHandle>,
}

impl SecurityContext {
    /// Initiator context towards `peer`.
    ///
    /// `mechanism` defaults to the registry's default mechanism. Without a
    /// credential the mechanism's default initiator credential is used.
    pub fn initiator(
        registry: Arc<MechanismRegistry>,
        peer: PrincipalName,
        mechanism: Option<Oid>,
        credential: Option<Arc<Credential>>,
        lifetime: Lifetime,
    ) -> Self {
        let mechanism = mechanism.unwrap_or_else(|| registry.default_mechanism().clone());
        let context = Self::new(registry, ContextRole::Initiator, credential);
        let context = Self {
            mechanism: Some(mechanism),
            peer: Some(peer),
            lifetime,
            ..context
        };
        debug!(
            context_id = %context.id,
            mechanism = ?context.mechanism,
            "[Context] Initiator created"
        );
        context
    }

    /// Acceptor context; the mechanism is learned from the first token.
    pub fn acceptor(registry: Arc<MechanismRegistry>, credential: Option<Arc<Credential>>) -> Self {
        let context = Self::new(registry, ContextRole::Acceptor, credential);
        debug!(context_id = %context.id, "[Context] Acceptor created");
        context
    }

    /// Rebuild a context from an interprocess token.
    ///
    /// Only native factories are asked, in known-mechanism order.
    pub fn import(registry: Arc<MechanismRegistry>, token: &[u8]) -> GssResult<Self> {
        if token.is_empty() {
            return Err(GssError::invalid_state("empty interprocess token"));
        }

        for mechanism in registry.known_mechanisms() {
            let resolved = match registry.resolve(Some(&mechanism), None) {
                Ok(resolved) => resolved,
                Err(e) => {
                    debug!(mechanism = %mechanism, error = %e, "[Context] Import skipping");
                    continue;
                }
            };
            if !resolved.factory.is_native() {
                continue;
            }
            let Some(engine) = resolved.factory.import_context(token)? else {
                continue;
            };

            let role = if engine.is_initiator() {
                ContextRole::Initiator
            } else {
                ContextRole::Acceptor
            };
            let state = if engine.is_established() {
                ContextState::Ready
            } else {
                ContextState::InProgress
            };
            let mut context = Self::new(Arc::clone(&registry), role, None);
            context.mechanism = Some(engine.mechanism());
            context.state = state;
            context.engine = Some(engine);
            context.provider = Some(resolved.provider);
            info!(
                context_id = %context.id,
                mechanism = %mechanism,
                state = %state,
                "[Context] Imported"
            );
            return Ok(context);
        }

        Err(GssError::failure("no mechanism accepted the interprocess token"))
    }

    fn new(
        registry: Arc<MechanismRegistry>,
        role: ContextRole,
        credential: Option<Arc<Credential>>,
    ) -> Self {
        metric_inc!(CONTEXTS_CREATED, &[role.as_str()]);
        Self {
            id: Uuid::new_v4(),
            registry,
            role,
            state: ContextState::PreInit,
            mechanism: None,
            peer: None,
            credential,
            lifetime: Lifetime::INDEFINITE,
            flags: RequestFlags::default(),
            channel_binding: None,
            engine: None,
            provider: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn role(&self) -> ContextRole {
        self.role
    }

    // =========================================================================
    // ESTABLISHMENT
    // =========================================================================

    /// Process the acceptor's latest token (empty on the first call) and
    /// return the next token to send, possibly empty.
    pub fn initiate(&mut self, input: &[u8]) -> GssResult<Vec<u8>> {
        self.ensure_role(ContextRole::Initiator, "initiate")?;
        self.ensure_establishing("initiate")?;

        if self.state == ContextState::PreInit {
            // Nothing precedes the initiator's first token
            if !input.is_empty() {
                debug!(context_id = %self.id, "[Context] Ignoring input to first initiate");
            }
            self.start_initiator()?;
            return self.advance_first(&[]);
        }
        let body = if input.is_empty() {
            input
        } else {
            self.strip_header(input)?
        };
        self.advance(body, false)
    }

    /// Process the initiator's latest token and return the reply, possibly
    /// empty.
    pub fn accept(&mut self, input: &[u8]) -> GssResult<Vec<u8>> {
        self.ensure_role(ContextRole::Acceptor, "accept")?;
        self.ensure_establishing("accept")?;

        if self.state == ContextState::PreInit {
            let body = self.start_acceptor(input)?;
            return self.advance_first(body);
        }
        let body = self.strip_header(input)?;
        self.advance(body, false)
    }

    pub fn is_established(&self) -> bool {
        self.state == ContextState::Ready
    }

    fn start_initiator(&mut self) -> GssResult<()> {
        let mechanism = self.fixed_mechanism()?.clone();
        let peer = self
            .peer
            .clone()
            .ok_or_else(|| GssError::invalid_state("initiator has no target name"))?;

        let (element, pinned) = match &self.credential {
            Some(credential) => {
                let slot = initiator_element(credential, &mechanism)?;
                (Some(slot.element), Some(slot.provider))
            }
            None => (None, None),
        };

        let resolved = self.registry.resolve(Some(&mechanism), pinned.as_ref())?;
        let target = resolved
            .factory
            .name_element(peer.value(), peer.name_type())?;
        let mut engine = resolved
            .factory
            .initiator_context(&target, element, self.lifetime)?;
        let configured = engine.request_flags(&self.flags).and_then(|()| {
            match &self.channel_binding {
                Some(binding) => engine.set_channel_binding(binding),
                None => Ok(()),
            }
        });
        if let Err(e) = configured {
            engine.dispose();
            return Err(e);
        }

        debug!(
            context_id = %self.id,
            mechanism = %mechanism,
            provider = resolved.provider.name(),
            "[Context] Initiator engine created"
        );
        self.engine = Some(engine);
        self.provider = Some(resolved.provider);
        Ok(())
    }

    /// Build the acceptor engine and return the part of `input` it consumes.
    fn start_acceptor<'a>(&mut self, input: &'a [u8]) -> GssResult<&'a [u8]> {
        let (header, body) = TokenHeader::split(input).inspect_err(|e| self.reject(e))?;
        let mechanism = header.mechanism().clone();

        let (element, pinned) = match &self.credential {
            Some(credential) => {
                let slot = credential.element(Some(&mechanism), false)?;
                (Some(slot.element), Some(slot.provider))
            }
            None => (None, None),
        };

        let resolved = self.registry.resolve(Some(&mechanism), pinned.as_ref())?;
        let mut engine = resolved.factory.acceptor_context(element)?;
        if let Some(binding) = &self.channel_binding {
            if let Err(e) = engine.set_channel_binding(binding) {
                engine.dispose();
                return Err(e);
            }
        }

        debug!(
            context_id = %self.id,
            mechanism = %mechanism,
            provider = resolved.provider.name(),
            "[Context] Acceptor engine created"
        );
        let consumed = if engine.is_native() { input } else { body };
        self.mechanism = Some(mechanism);
        self.engine = Some(engine);
        self.provider = Some(resolved.provider);
        Ok(consumed)
    }

    /// First step on a fresh engine. On failure the engine is disposed and
    /// the context stays `PreInit` with no engine, ready for another try.
    fn advance_first(&mut self, input: &[u8]) -> GssResult<Vec<u8>> {
        let result = self.advance(input, true);
        if result.is_err() {
            if let Some(mut engine) = self.engine.take() {
                engine.dispose();
            }
            self.provider = None;
            if self.role == ContextRole::Acceptor {
                self.mechanism = None;
            }
            debug!(context_id = %self.id, "[Context] First step failed, engine released");
        }
        result
    }

    /// Step the engine once and frame its output.
    fn advance(&mut self, input: &[u8], first: bool) -> GssResult<Vec<u8>> {
        let role = self.role;
        let mechanism = self.fixed_mechanism()?.clone();
        let engine = self.engine_mut()?;

        let started = Instant::now();
        let output = engine.step(input);
        metric_observe!(
            HANDSHAKE_STEP_DURATION,
            &[role.as_str()],
            started.elapsed().as_secs_f64()
        );
        let output = output?;

        let exempt = engine.is_native()
            || (mechanism == Oid::SPNEGO && !(role == ContextRole::Initiator && first));
        let established = engine.is_established();

        let output = if output.is_empty() || exempt {
            output
        } else {
            TokenHeader::frame(&mechanism, &output)?
        };

        if established {
            self.state = ContextState::Ready;
            metric_inc!(CONTEXTS_ESTABLISHED, &[role.as_str()]);
            info!(
                context_id = %self.id,
                role = role.as_str(),
                mechanism = ?self.mechanism(),
                "[Context] Established"
            );
        } else if self.state == ContextState::PreInit {
            self.state = ContextState::InProgress;
            debug!(context_id = %self.id, "[Context] Negotiation in progress");
        }
        Ok(output)
    }

    /// Check and remove the header from a continuation token.
    fn strip_header<'a>(&self, input: &'a [u8]) -> GssResult<&'a [u8]> {
        let engine = self.engine_ref()?;
        let mechanism = self.fixed_mechanism()?;
        if engine.is_native() || mechanism == &Oid::SPNEGO {
            return Ok(input);
        }

        let (header, body) = TokenHeader::split(input).inspect_err(|e| self.reject(e))?;
        if header.mechanism() != mechanism {
            let err = GssError::MechanismMismatch {
                expected: mechanism.clone(),
                actual: header.mechanism().clone(),
            };
            self.reject(&err);
            return Err(err);
        }
        Ok(body)
    }

    fn reject(&self, error: &GssError) {
        let reason = match error.kind() {
            ErrorKind::MechanismMismatch => "mechanism_mismatch",
            _ => "malformed",
        };
        metric_inc!(TOKENS_REJECTED, &[reason]);
        warn!(context_id = %self.id, error = %error, "[Context] Rejected inbound token");
    }

    // =========================================================================
    // PER-MESSAGE
    // =========================================================================

    pub fn protect(&mut self, message: &[u8], prop: &mut MessageProp) -> GssResult<Vec<u8>> {
        self.engine_mut()?.protect(message, prop)
    }

    pub fn unprotect(&mut self, token: &[u8], prop: &mut MessageProp) -> GssResult<Vec<u8>> {
        let message = self.engine_mut()?.unprotect(token, prop)?;
        self.note_sequence(prop.supplementary);
        Ok(message)
    }

    pub fn sign(&mut self, message: &[u8], prop: &mut MessageProp) -> GssResult<Vec<u8>> {
        self.engine_mut()?.sign(message, prop)
    }

    pub fn verify(
        &mut self,
        token: &[u8],
        message: &[u8],
        prop: &mut MessageProp,
    ) -> GssResult<()> {
        self.engine_mut()?.verify(token, message, prop)?;
        self.note_sequence(prop.supplementary);
        Ok(())
    }

    fn note_sequence(&self, status: SupplementaryStatus) {
        if status != SupplementaryStatus::InOrder {
            metric_inc!(SEQUENCE_ANOMALIES, &[status.as_str()]);
            debug!(context_id = %self.id, status = status.as_str(), "[Context] Sequence anomaly");
        }
    }

    /// Largest message that protects into `max_token_size` bytes.
    pub fn wrap_size_limit(
        &self,
        qop: u32,
        confidential: bool,
        max_token_size: usize,
    ) -> GssResult<usize> {
        self.engine_ref()?.wrap_size_limit(qop, confidential, max_token_size)
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Serialize the context for another process.
    ///
    /// `Ok(None)` unless the engine is native and transferable. On success
    /// this context is deleted.
    pub fn export_to_interprocess_token(&mut self) -> GssResult<Option<Vec<u8>>> {
        self.ensure_live()?;
        let Some(engine) = self.engine.as_mut() else {
            return Ok(None);
        };
        if !(engine.is_transferable() && engine.is_native()) {
            return Ok(None);
        }

        let token = engine.export()?;
        info!(context_id = %self.id, "[Context] Exported");
        self.dispose();
        Ok(Some(token))
    }

    /// Release the engine and cached references. Idempotent.
    pub fn dispose(&mut self) {
        if self.state == ContextState::Deleted {
            return;
        }
        if let Some(mut engine) = self.engine.take() {
            engine.dispose();
        }
        self.credential = None;
        self.peer = None;
        self.provider = None;
        self.state = ContextState::Deleted;
        debug!(context_id = %self.id, "[Context] Disposed");
    }

    // =========================================================================
    // REQUESTS
    // =========================================================================

    /// Requests only take effect on an initiator before the first token.
    fn can_request(&self) -> bool {
        self.state == ContextState::PreInit && self.role == ContextRole::Initiator
    }

    fn request(&mut self, apply: impl FnOnce(&mut RequestFlags)) {
        if self.can_request() {
            apply(&mut self.flags);
        }
    }

    pub fn request_confidentiality(&mut self, on: bool) {
        self.request(|f| f.confidentiality = on);
    }

    pub fn request_integrity(&mut self, on: bool) {
        self.request(|f| f.integrity = on);
    }

    pub fn request_mutual_auth(&mut self, on: bool) {
        self.request(|f| f.mutual_auth = on);
    }

    pub fn request_replay_detection(&mut self, on: bool) {
        self.request(|f| f.replay_detection = on);
    }

    pub fn request_sequence_detection(&mut self, on: bool) {
        self.request(|f| f.sequence_detection = on);
    }

    pub fn request_credential_delegation(&mut self, on: bool) {
        self.request(|f| f.credential_delegation = on);
    }

    pub fn request_anonymity(&mut self, on: bool) {
        self.request(|f| f.anonymity = on);
    }

    pub fn request_delegation_policy(&mut self, on: bool) {
        self.request(|f| f.delegation_policy = on);
    }

    pub fn request_lifetime(&mut self, lifetime: Lifetime) {
        if self.can_request() {
            self.lifetime = lifetime;
        }
    }

    /// Either role may bind before the first token.
    pub fn set_channel_binding(&mut self, binding: ChannelBinding) {
        if self.state == ContextState::PreInit {
            self.channel_binding = Some(binding);
        }
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Flags in effect: the engine's once it exists, the requested ones
    /// before.
    ///
    /// This and the other plain getters (`*_state`, `lifetime`,
    /// `mechanism`) stay readable after [`dispose`](Self::dispose) and then
    /// report the requested values. Everything that needs the engine or the
    /// peer names fails on a deleted context.
    pub fn flags(&self) -> RequestFlags {
        match &self.engine {
            Some(engine) => engine.flags(),
            None => self.flags,
        }
    }

    pub fn confidentiality_state(&self) -> bool {
        self.flags().confidentiality
    }

    pub fn integrity_state(&self) -> bool {
        self.flags().integrity
    }

    pub fn mutual_auth_state(&self) -> bool {
        self.flags().mutual_auth
    }

    pub fn replay_detection_state(&self) -> bool {
        self.flags().replay_detection
    }

    pub fn sequence_detection_state(&self) -> bool {
        self.flags().sequence_detection
    }

    pub fn credential_delegation_state(&self) -> bool {
        self.flags().credential_delegation
    }

    pub fn anonymity_state(&self) -> bool {
        self.flags().anonymity
    }

    pub fn delegation_policy_state(&self) -> bool {
        self.flags().delegation_policy
    }

    pub fn lifetime(&self) -> Lifetime {
        match &self.engine {
            Some(engine) => engine.lifetime(),
            None => self.lifetime,
        }
    }

    /// Negotiated mechanism, or the requested one before negotiation.
    pub fn mechanism(&self) -> Option<Oid> {
        match &self.engine {
            Some(engine) => Some(engine.mechanism()),
            None => self.mechanism.clone(),
        }
    }

    pub fn source_name(&self) -> GssResult<Option<PrincipalName>> {
        self.ensure_live()?;
        Ok(self
            .engine
            .as_ref()
            .and_then(|engine| engine.source_name())
            .map(|name| name.to_principal()))
    }

    /// The engine's target, or the name the initiator was created for.
    pub fn target_name(&self) -> GssResult<Option<PrincipalName>> {
        self.ensure_live()?;
        let from_engine: Option<NameRef> = self.engine.as_ref().and_then(|e| e.target_name());
        Ok(from_engine
            .map(|name| name.to_principal())
            .or_else(|| self.peer.clone()))
    }

    /// Credential the initiator delegated, wrapped for reuse.
    pub fn delegated_credential(&self) -> GssResult<Option<Arc<Credential>>> {
        let engine = self.engine_ref()?;
        let Some(element): Option<CredentialElementRef> = engine.delegated_credential() else {
            return Ok(None);
        };
        let provider = self
            .provider
            .clone()
            .ok_or_else(|| GssError::invalid_state("context has no provider"))?;
        let credential = Credential::from_element(Arc::clone(&self.registry), provider, element)?;
        Ok(Some(Arc::new(credential)))
    }

    pub fn is_protection_ready(&self) -> bool {
        self.engine
            .as_ref()
            .is_some_and(|engine| engine.is_protection_ready())
    }

    pub fn is_transferable(&self) -> bool {
        self.engine
            .as_ref()
            .is_some_and(|engine| engine.is_transferable())
    }

    pub fn is_initiator(&self) -> bool {
        self.role == ContextRole::Initiator
    }

    /// Mechanism-specific attribute of an established engine.
    pub fn inquire(&self, kind: InquireType) -> GssResult<InquireValue> {
        self.engine_ref()?.inquire(kind)
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn ensure_live(&self) -> GssResult<()> {
        if self.state == ContextState::Deleted {
            return Err(GssError::invalid_state("context has been deleted"));
        }
        Ok(())
    }

    fn ensure_role(&self, role: ContextRole, operation: &str) -> GssResult<()> {
        if self.role != role {
            return Err(GssError::invalid_state(format!(
                "{operation} called on an {} context",
                self.role.as_str()
            )));
        }
        Ok(())
    }

    fn ensure_establishing(&self, operation: &str) -> GssResult<()> {
        match self.state {
            ContextState::PreInit | ContextState::InProgress => Ok(()),
            state => Err(GssError::invalid_state(format!(
                "{operation} not allowed in state {state}"
            ))),
        }
    }

    fn fixed_mechanism(&self) -> GssResult<&Oid> {
        self.mechanism
            .as_ref()
            .ok_or_else(|| GssError::invalid_state("mechanism not yet known"))
    }

    fn engine_ref(&self) -> GssResult<&dyn MechanismContext> {
        self.engine
            .as_deref()
            .ok_or_else(|| GssError::invalid_state("no security context established"))
    }

    fn engine_mut(&mut self) -> GssResult<&mut Box<dyn MechanismContext>> {
        self.engine
            .as_mut()
            .ok_or_else(|| GssError::invalid_state("no security context established"))
    }
}

impl fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityContext")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("state", &self.state)
            .field("mechanism", &self.mechanism)
            .finish()
    }
}

/// Initiator element for `mechanism`. A negotiating mechanism without its
/// own element falls back to the credential's first mechanism.
fn initiator_element(credential: &Credential, mechanism: &Oid) -> GssResult<CredentialSlot> {
    match credential.element(Some(mechanism), true) {
        Err(e) if mechanism == &Oid::SPNEGO && e.is(ErrorKind::NoCredential) => {
            let Some(fallback) = credential.mechanisms()?.into_iter().next() else {
                return Err(e);
            };
            debug!(
                fallback = %fallback,
                "[Context] No negotiation credential, using underlying mechanism"
            );
            credential.element(Some(&fallback), true)
        }
        other => other,
    }
}
