//! Negotiating pseudo-mechanism that wraps exactly one inner mechanism.
//!
//! Its context tokens are deliberately simple:
//!
//! ```text
//! NEG_INIT  = 0xA0 | count:u8 | count * mechanism DER | blob(framed inner token)
//! NEG_RESP  = 0xA1 | state:u8 | blob(inner token)
//! ```
//!
//! The acceptor always answers, so the initiator learns the outcome even
//! when the inner mechanism needs a single token.

use super::wire::{put_blob, WireReader};
use crate::domain::TokenHeader;
use crate::ports::{
    CredentialElement, CredentialElementRef, MechanismContext, MechanismFactory, NameRef,
};
use gss_types::{
    ChannelBinding, CredentialUsage, GssError, GssResult, InquireType, InquireValue, Lifetime,
    MessageProp, Oid, RequestFlags, DER_OID_TAG,
};
use std::any::Any;
use std::sync::Arc;

const NEG_INIT: u8 = 0xA0;
const NEG_RESP: u8 = 0xA1;

const ACCEPT_COMPLETED: u8 = 0;
const ACCEPT_INCOMPLETE: u8 = 1;

/// Negotiating factory around `inner`.
pub struct NegotiationFactory {
    mechanism: Oid,
    inner: Arc<dyn MechanismFactory>,
}

impl NegotiationFactory {
    pub fn new(inner: Arc<dyn MechanismFactory>) -> Self {
        Self {
            mechanism: Oid::SPNEGO,
            inner,
        }
    }

    fn unwrap_credential(credential: Option<CredentialElementRef>) -> Option<CredentialElementRef> {
        credential.map(|element| {
            match element.as_any().downcast_ref::<NegotiationCredential>() {
                Some(wrapped) => Arc::clone(&wrapped.inner),
                None => element,
            }
        })
    }
}

impl MechanismFactory for NegotiationFactory {
    fn mechanism(&self) -> &Oid {
        &self.mechanism
    }

    fn name_types(&self) -> Vec<Oid> {
        self.inner.name_types()
    }

    fn name_element(&self, value: &str, name_type: &Oid) -> GssResult<NameRef> {
        self.inner.name_element(value, name_type)
    }

    fn credential_element(
        &self,
        name: Option<&NameRef>,
        init_lifetime: Lifetime,
        accept_lifetime: Lifetime,
        usage: CredentialUsage,
    ) -> GssResult<CredentialElementRef> {
        let inner = self
            .inner
            .credential_element(name, init_lifetime, accept_lifetime, usage)?;
        Ok(Arc::new(NegotiationCredential {
            mechanism: Oid::SPNEGO,
            inner,
        }))
    }

    fn initiator_context(
        &self,
        peer: &NameRef,
        credential: Option<CredentialElementRef>,
        lifetime: Lifetime,
    ) -> GssResult<Box<dyn MechanismContext>> {
        let inner = self
            .inner
            .initiator_context(peer, Self::unwrap_credential(credential), lifetime)?;
        Ok(Box::new(NegotiationContext::new(inner, true)))
    }

    fn acceptor_context(
        &self,
        credential: Option<CredentialElementRef>,
    ) -> GssResult<Box<dyn MechanismContext>> {
        let inner = self
            .inner
            .acceptor_context(Self::unwrap_credential(credential))?;
        Ok(Box::new(NegotiationContext::new(inner, false)))
    }
}

/// Inner element re-labelled with the negotiating mechanism.
#[derive(Debug)]
pub struct NegotiationCredential {
    mechanism: Oid,
    inner: CredentialElementRef,
}

impl CredentialElement for NegotiationCredential {
    fn mechanism(&self) -> &Oid {
        &self.mechanism
    }

    fn name(&self) -> GssResult<NameRef> {
        self.inner.name()
    }

    fn init_lifetime(&self) -> Lifetime {
        self.inner.init_lifetime()
    }

    fn accept_lifetime(&self) -> Lifetime {
        self.inner.accept_lifetime()
    }

    fn is_initiator(&self) -> bool {
        self.inner.is_initiator()
    }

    fn is_acceptor(&self) -> bool {
        self.inner.is_acceptor()
    }

    fn dispose(&self) {
        self.inner.dispose();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct NegotiationContext {
    inner: Box<dyn MechanismContext>,
    initiator: bool,
    started: bool,
    complete: bool,
}

impl NegotiationContext {
    fn new(inner: Box<dyn MechanismContext>, initiator: bool) -> Self {
        Self {
            inner,
            initiator,
            started: false,
            complete: false,
        }
    }

    fn response(state: u8, inner: &[u8]) -> GssResult<Vec<u8>> {
        let mut token = vec![NEG_RESP, state];
        put_blob(&mut token, inner)?;
        Ok(token)
    }

    fn initiate(&mut self) -> GssResult<Vec<u8>> {
        let mechanism = self.inner.mechanism();
        let inner_token = self.inner.step(&[])?;
        let framed = if self.inner.is_native() {
            inner_token
        } else {
            TokenHeader::frame(&mechanism, &inner_token)?
        };

        let mut token = vec![NEG_INIT, 1];
        token.extend_from_slice(&mechanism.to_der());
        put_blob(&mut token, &framed)?;
        self.started = true;
        Ok(token)
    }

    fn accept_init(&mut self, input: &[u8]) -> GssResult<Vec<u8>> {
        let mut reader = WireReader::new(input, "negotiation init token");
        if reader.u8()? != NEG_INIT {
            return Err(GssError::malformed("expected negotiation init token"));
        }
        let count = reader.u8()?;
        let mut offered = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let tag = reader.u8()?;
            let len = reader.u8()?;
            if tag != DER_OID_TAG || len & 0x80 != 0 {
                return Err(GssError::malformed("bad mechanism in negotiation init token"));
            }
            offered.push(Oid::from_content(reader.bytes(usize::from(len))?)?);
        }
        let framed = reader.blob()?;
        reader.finish()?;
        self.started = true;

        let ours = self.inner.mechanism();
        match offered.first() {
            Some(first) if first == &ours => {}
            Some(first) => return Err(GssError::unsupported(first)),
            None => return Err(GssError::malformed("negotiation init token offers nothing")),
        }

        let inner_input = if self.inner.is_native() {
            framed
        } else {
            let (header, body) = TokenHeader::split(framed)?;
            if header.mechanism() != &ours {
                return Err(GssError::MechanismMismatch {
                    expected: ours,
                    actual: header.mechanism().clone(),
                });
            }
            body
        };
        self.continue_accept(inner_input)
    }

    fn continue_accept(&mut self, inner_input: &[u8]) -> GssResult<Vec<u8>> {
        let reply = self.inner.step(inner_input)?;
        if self.inner.is_established() {
            self.complete = true;
            Self::response(ACCEPT_COMPLETED, &reply)
        } else {
            Self::response(ACCEPT_INCOMPLETE, &reply)
        }
    }

    fn read_response<'a>(input: &'a [u8]) -> GssResult<(u8, &'a [u8])> {
        let mut reader = WireReader::new(input, "negotiation response token");
        if reader.u8()? != NEG_RESP {
            return Err(GssError::malformed("expected negotiation response token"));
        }
        let state = reader.u8()?;
        let inner = reader.blob()?;
        reader.finish()?;
        Ok((state, inner))
    }
}

impl MechanismContext for NegotiationContext {
    /// The negotiated mechanism once established.
    fn mechanism(&self) -> Oid {
        if self.is_established() {
            self.inner.mechanism()
        } else {
            Oid::SPNEGO
        }
    }

    fn request_flags(&mut self, flags: &RequestFlags) -> GssResult<()> {
        self.inner.request_flags(flags)
    }

    fn set_channel_binding(&mut self, binding: &ChannelBinding) -> GssResult<()> {
        self.inner.set_channel_binding(binding)
    }

    fn step(&mut self, input: &[u8]) -> GssResult<Vec<u8>> {
        if self.complete {
            return Err(GssError::invalid_state("negotiation already complete"));
        }
        match (self.initiator, self.started) {
            (true, false) => self.initiate(),
            (false, false) => self.accept_init(input),
            (true, true) => {
                let (state, inner) = Self::read_response(input)?;
                let out = if inner.is_empty() {
                    Vec::new()
                } else {
                    self.inner.step(inner)?
                };
                if state == ACCEPT_COMPLETED && self.inner.is_established() {
                    self.complete = true;
                }
                if out.is_empty() {
                    Ok(out)
                } else {
                    Self::response(ACCEPT_INCOMPLETE, &out)
                }
            }
            (false, true) => {
                let (_, inner) = Self::read_response(input)?;
                self.continue_accept(inner)
            }
        }
    }

    fn is_established(&self) -> bool {
        self.complete && self.inner.is_established()
    }

    fn is_protection_ready(&self) -> bool {
        self.inner.is_protection_ready()
    }

    fn is_transferable(&self) -> bool {
        self.inner.is_transferable()
    }

    fn is_initiator(&self) -> bool {
        self.initiator
    }

    fn flags(&self) -> RequestFlags {
        self.inner.flags()
    }

    fn lifetime(&self) -> Lifetime {
        self.inner.lifetime()
    }

    fn source_name(&self) -> Option<NameRef> {
        self.inner.source_name()
    }

    fn target_name(&self) -> Option<NameRef> {
        self.inner.target_name()
    }

    fn delegated_credential(&self) -> Option<CredentialElementRef> {
        self.inner.delegated_credential()
    }

    fn wrap_size_limit(
        &self,
        qop: u32,
        confidential: bool,
        max_token_size: usize,
    ) -> GssResult<usize> {
        self.inner.wrap_size_limit(qop, confidential, max_token_size)
    }

    fn protect(&mut self, message: &[u8], prop: &mut MessageProp) -> GssResult<Vec<u8>> {
        self.inner.protect(message, prop)
    }

    fn unprotect(&mut self, token: &[u8], prop: &mut MessageProp) -> GssResult<Vec<u8>> {
        self.inner.unprotect(token, prop)
    }

    fn sign(&mut self, message: &[u8], prop: &mut MessageProp) -> GssResult<Vec<u8>> {
        self.inner.sign(message, prop)
    }

    fn verify(&mut self, token: &[u8], message: &[u8], prop: &mut MessageProp) -> GssResult<()> {
        self.inner.verify(token, message, prop)
    }

    fn inquire(&self, kind: InquireType) -> GssResult<InquireValue> {
        self.inner.inquire(kind)
    }

    fn dispose(&mut self) {
        self.inner.dispose();
    }
}
