//! # Loopback Mechanism
//!
//! A complete in-memory mechanism for exercising the negotiation core
//! without a KDC. An in-process [`LoopbackRealm`] plays the key
//! distribution role: every principal has a random 256-bit key.
//!
//! ## Handshake
//!
//! The initiator sends one token carrying its flags, initial sequence
//! number, a nonce, both names, a channel-binding digest and two
//! HMAC-SHA256 tags (one under each principal's key). The session key is
//! derived from the target's key and the nonce. With mutual authentication
//! the acceptor answers with a reply token proving it derived the same
//! key; without it the handshake is a single token.
//!
//! ## Per-message tokens
//!
//! Wrap and MIC tokens carry a direction byte, a sequence number and an
//! HMAC tag. Received sequence numbers go through a [`SequenceTracker`].
//!
//! ## Native flavour
//!
//! A native factory frames its own context tokens and supports export and
//! import of established contexts.

use super::wire::{put_string, WireReader};
use crate::domain::{SequenceTracker, TokenHeader};
use crate::ports::{
    CredentialElement, CredentialElementRef, MechanismContext, MechanismFactory, NameElement,
    NameRef,
};
use gss_types::{
    ChannelBinding, CredentialUsage, GssError, GssResult, InquireType, InquireValue, Lifetime,
    MessageProp, Oid, RequestFlags, SupplementaryStatus,
};
use hmac::{Hmac, Mac};
use parking_lot::{Mutex, RwLock};
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;
type Key = Zeroizing<Vec<u8>>;

/// `1.3.6.1.4.1.32473.1.1`, under the documentation enterprise arc.
pub const LOOPBACK_MECHANISM: Oid =
    Oid::from_static(&[0x2b, 0x06, 0x01, 0x04, 0x01, 0x81, 0xfd, 0x59, 0x01, 0x01]);

/// Lifetime granted when the caller asks for the default.
pub const DEFAULT_LIFETIME: Lifetime = Lifetime::from_secs(8 * 3600);

const KEY_LEN: usize = 32;
const TAG_LEN: usize = 32;
const NONCE_LEN: usize = 16;

const TOK_INIT: u8 = 0x01;
const TOK_REPLY: u8 = 0x02;
const TOK_WRAP: u8 = 0x10;
const TOK_MIC: u8 = 0x11;

const DIR_INITIATOR: u8 = 0;
const DIR_ACCEPTOR: u8 = 1;

/// Type, direction, sequence number, privacy flag and tag.
const WRAP_OVERHEAD: usize = 1 + 1 + 4 + 1 + TAG_LEN;

const EXPORT_MAGIC: &[u8; 4] = b"LBX1";

// =============================================================================
// REALM
// =============================================================================

/// Shared in-memory principal database.
#[derive(Clone, Default)]
pub struct LoopbackRealm {
    keys: Arc<RwLock<HashMap<String, Key>>>,
}

impl LoopbackRealm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_principals(names: &[&str]) -> Self {
        let realm = Self::new();
        for name in names {
            realm.add_principal(name);
        }
        realm
    }

    /// Register `name` with a fresh random key.
    pub fn add_principal(&self, name: &str) {
        let mut key = Zeroizing::new(vec![0u8; KEY_LEN]);
        rand::thread_rng().fill_bytes(&mut key);
        self.keys.write().insert(name.to_string(), key);
    }

    pub fn remove_principal(&self, name: &str) {
        self.keys.write().remove(name);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.keys.read().contains_key(name)
    }

    fn key(&self, name: &str) -> Option<Key> {
        self.keys.read().get(name).cloned()
    }
}

impl fmt::Debug for LoopbackRealm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.keys.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("LoopbackRealm")
            .field("principals", &names)
            .finish()
    }
}

// =============================================================================
// NAMES AND CREDENTIALS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopbackName {
    value: String,
    name_type: Oid,
    mechanism: Oid,
}

impl LoopbackName {
    /// Host-based `service@host` names become `service/host`.
    fn canonical(value: &str, name_type: &Oid) -> Self {
        let value = if name_type == &Oid::NT_HOSTBASED_SERVICE {
            value.replacen('@', "/", 1)
        } else {
            value.to_string()
        };
        Self {
            value,
            name_type: name_type.clone(),
            mechanism: LOOPBACK_MECHANISM,
        }
    }

    fn user(value: &str) -> Self {
        Self::canonical(value, &Oid::NT_USER_NAME)
    }
}

impl NameElement for LoopbackName {
    fn printable(&self) -> String {
        self.value.clone()
    }

    fn name_type(&self) -> &Oid {
        &self.name_type
    }

    fn mechanism(&self) -> &Oid {
        &self.mechanism
    }
}

/// Credential element holding a principal's realm key.
pub struct LoopbackCredential {
    mechanism: Oid,
    name: Arc<LoopbackName>,
    key: Mutex<Option<Key>>,
    init_lifetime: Lifetime,
    accept_lifetime: Lifetime,
    initiator: bool,
    acceptor: bool,
}

impl LoopbackCredential {
    fn new(
        name: Arc<LoopbackName>,
        key: Key,
        lifetime: (Lifetime, Lifetime),
        usage: (bool, bool),
    ) -> Self {
        Self {
            mechanism: LOOPBACK_MECHANISM,
            name,
            key: Mutex::new(Some(key)),
            init_lifetime: if usage.0 { lifetime.0 } else { Lifetime::DEFAULT },
            accept_lifetime: if usage.1 { lifetime.1 } else { Lifetime::DEFAULT },
            initiator: usage.0,
            acceptor: usage.1,
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.key.lock().is_none()
    }

    fn key(&self) -> GssResult<Key> {
        self.key
            .lock()
            .clone()
            .ok_or_else(|| GssError::invalid_state("credential element disposed"))
    }
}

impl fmt::Debug for LoopbackCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackCredential")
            .field("name", &self.name.value)
            .field("initiator", &self.initiator)
            .field("acceptor", &self.acceptor)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl CredentialElement for LoopbackCredential {
    fn mechanism(&self) -> &Oid {
        &self.mechanism
    }

    fn name(&self) -> GssResult<NameRef> {
        Ok(self.name.clone())
    }

    fn init_lifetime(&self) -> Lifetime {
        self.init_lifetime
    }

    fn accept_lifetime(&self) -> Lifetime {
        self.accept_lifetime
    }

    fn is_initiator(&self) -> bool {
        self.initiator
    }

    fn is_acceptor(&self) -> bool {
        self.acceptor
    }

    fn dispose(&self) {
        self.key.lock().take();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn own_credential(element: &CredentialElementRef) -> GssResult<&LoopbackCredential> {
    element
        .as_any()
        .downcast_ref::<LoopbackCredential>()
        .ok_or_else(|| GssError::failure("credential element belongs to another mechanism"))
}

// =============================================================================
// FACTORY
// =============================================================================

/// Factory for loopback names, credentials and contexts.
#[derive(Debug, Clone)]
pub struct LoopbackFactory {
    mechanism: Oid,
    realm: LoopbackRealm,
    native: bool,
    single_direction: bool,
    default_principal: Option<String>,
}

impl LoopbackFactory {
    pub fn new(realm: LoopbackRealm) -> Self {
        Self {
            mechanism: LOOPBACK_MECHANISM,
            realm,
            native: false,
            single_direction: false,
            default_principal: None,
        }
    }

    /// Self-framing, transferable contexts.
    pub fn native(mut self) -> Self {
        self.native = true;
        self
    }

    /// Never hand out combined initiate-and-accept elements.
    pub fn single_direction(mut self) -> Self {
        self.single_direction = true;
        self
    }

    /// Principal used when no name is given.
    pub fn with_default_principal(mut self, name: &str) -> Self {
        self.default_principal = Some(name.to_string());
        self
    }

    pub fn realm(&self) -> &LoopbackRealm {
        &self.realm
    }

    fn credential_parts(
        &self,
        element: Option<CredentialElementRef>,
        initiate: bool,
        lifetime: Lifetime,
    ) -> GssResult<(Arc<LoopbackName>, Key)> {
        let element = match element {
            Some(element) => element,
            None => self.credential_element(
                None,
                lifetime,
                lifetime,
                CredentialUsage::single(initiate),
            )?,
        };
        let own = own_credential(&element)?;
        let usable = if initiate { own.initiator } else { own.acceptor };
        if !usable {
            return Err(GssError::no_credential(
                Some(&self.mechanism),
                Some(CredentialUsage::single(initiate)),
            ));
        }
        Ok((Arc::clone(&own.name), own.key()?))
    }
}

impl MechanismFactory for LoopbackFactory {
    fn mechanism(&self) -> &Oid {
        &self.mechanism
    }

    fn is_native(&self) -> bool {
        self.native
    }

    fn name_types(&self) -> Vec<Oid> {
        vec![Oid::NT_USER_NAME, Oid::NT_HOSTBASED_SERVICE]
    }

    fn name_element(&self, value: &str, name_type: &Oid) -> GssResult<NameRef> {
        if !self.name_types().contains(name_type) {
            return Err(GssError::failure(format!(
                "loopback mechanism cannot import name type {name_type}"
            )));
        }
        Ok(Arc::new(LoopbackName::canonical(value, name_type)))
    }

    fn credential_element(
        &self,
        name: Option<&NameRef>,
        init_lifetime: Lifetime,
        accept_lifetime: Lifetime,
        usage: CredentialUsage,
    ) -> GssResult<CredentialElementRef> {
        let name = match name {
            Some(name) => LoopbackName::canonical(&name.printable(), name.name_type()),
            None => self
                .default_principal
                .as_deref()
                .map(LoopbackName::user)
                .ok_or_else(|| GssError::no_credential(Some(&self.mechanism), Some(usage)))?,
        };
        let key = self
            .realm
            .key(&name.value)
            .ok_or_else(|| GssError::no_credential(Some(&self.mechanism), Some(usage)))?;

        let directions = match usage {
            CredentialUsage::InitiateAndAccept if self.single_direction => (true, false),
            CredentialUsage::InitiateAndAccept => (true, true),
            CredentialUsage::InitiateOnly => (true, false),
            CredentialUsage::AcceptOnly => (false, true),
        };
        Ok(Arc::new(LoopbackCredential::new(
            Arc::new(name),
            key,
            (resolve_lifetime(init_lifetime), resolve_lifetime(accept_lifetime)),
            directions,
        )))
    }

    fn initiator_context(
        &self,
        peer: &NameRef,
        credential: Option<CredentialElementRef>,
        lifetime: Lifetime,
    ) -> GssResult<Box<dyn MechanismContext>> {
        let (name, key) = self.credential_parts(credential, true, lifetime)?;
        let peer = Arc::new(LoopbackName::canonical(&peer.printable(), peer.name_type()));
        Ok(Box::new(LoopbackContext {
            local_name: Some(name),
            local_key: Some(key),
            peer_name: Some(peer),
            lifetime: resolve_lifetime(lifetime),
            ..LoopbackContext::new(self.realm.clone(), self.native, true)
        }))
    }

    fn acceptor_context(
        &self,
        credential: Option<CredentialElementRef>,
    ) -> GssResult<Box<dyn MechanismContext>> {
        let mut context = LoopbackContext::new(self.realm.clone(), self.native, false);
        // Without a credential any principal of the realm may be the target
        if credential.is_some() || self.default_principal.is_some() {
            let (name, key) = self.credential_parts(credential, false, Lifetime::DEFAULT)?;
            context.local_name = Some(name);
            context.local_key = Some(key);
        }
        Ok(Box::new(context))
    }

    fn import_context(&self, token: &[u8]) -> GssResult<Option<Box<dyn MechanismContext>>> {
        if !self.native || !token.starts_with(EXPORT_MAGIC) {
            return Ok(None);
        }
        let context = LoopbackContext::import(self.realm.clone(), &token[EXPORT_MAGIC.len()..])?;
        Ok(Some(Box::new(context)))
    }
}

fn resolve_lifetime(lifetime: Lifetime) -> Lifetime {
    if lifetime == Lifetime::DEFAULT {
        DEFAULT_LIFETIME
    } else {
        lifetime
    }
}

// =============================================================================
// CONTEXT
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Start,
    AwaitingReply,
    Established,
    Closed,
}

/// Loopback mechanism engine.
pub struct LoopbackContext {
    realm: LoopbackRealm,
    native: bool,
    initiator: bool,
    stage: Stage,
    requested: RequestFlags,
    negotiated: Option<RequestFlags>,
    lifetime: Lifetime,
    binding: Option<ChannelBinding>,
    local_name: Option<Arc<LoopbackName>>,
    local_key: Option<Key>,
    peer_name: Option<Arc<LoopbackName>>,
    nonce: [u8; NONCE_LEN],
    session_key: Option<Key>,
    send_seq: u32,
    received: Option<SequenceTracker>,
    delegated: Option<CredentialElementRef>,
    auth_time: u64,
}

impl LoopbackContext {
    fn new(realm: LoopbackRealm, native: bool, initiator: bool) -> Self {
        Self {
            realm,
            native,
            initiator,
            stage: Stage::Start,
            requested: RequestFlags::default(),
            negotiated: None,
            lifetime: DEFAULT_LIFETIME,
            binding: None,
            local_name: None,
            local_key: None,
            peer_name: None,
            nonce: [0u8; NONCE_LEN],
            session_key: None,
            send_seq: 0,
            received: None,
            delegated: None,
            auth_time: 0,
        }
    }

    fn direction(&self) -> u8 {
        if self.initiator {
            DIR_INITIATOR
        } else {
            DIR_ACCEPTOR
        }
    }

    fn peer_direction(&self) -> u8 {
        if self.initiator {
            DIR_ACCEPTOR
        } else {
            DIR_INITIATOR
        }
    }

    fn session_key(&self) -> GssResult<&[u8]> {
        self.session_key
            .as_deref()
            .map(Vec::as_slice)
            .ok_or_else(|| GssError::invalid_state("no session key established"))
    }

    fn binding_digest(&self) -> [u8; 32] {
        match &self.binding {
            Some(binding) => binding_digest(binding),
            None => [0u8; 32],
        }
    }

    /// Native engines carry their own framing.
    fn seal(&self, raw: Vec<u8>) -> GssResult<Vec<u8>> {
        if self.native {
            TokenHeader::frame(&LOOPBACK_MECHANISM, &raw)
        } else {
            Ok(raw)
        }
    }

    fn open<'a>(&self, input: &'a [u8]) -> GssResult<&'a [u8]> {
        if !self.native {
            return Ok(input);
        }
        let (header, body) = TokenHeader::split(input)?;
        if header.mechanism() != &LOOPBACK_MECHANISM {
            return Err(GssError::MechanismMismatch {
                expected: LOOPBACK_MECHANISM,
                actual: header.mechanism().clone(),
            });
        }
        Ok(body)
    }

    fn negotiate(flags: &RequestFlags) -> RequestFlags {
        RequestFlags {
            anonymity: false,
            delegation_policy: false,
            ..*flags
        }
    }

    fn establish(&mut self, flags: RequestFlags) {
        self.negotiated = Some(flags);
        self.stage = Stage::Established;
        self.auth_time = now_secs();
    }

    // ===== INITIATOR =====

    fn initial_token(&mut self) -> GssResult<Vec<u8>> {
        let client = self
            .local_name
            .clone()
            .ok_or_else(|| GssError::invalid_state("initiator has no credential"))?;
        let target = self
            .peer_name
            .clone()
            .ok_or_else(|| GssError::invalid_state("initiator has no target"))?;
        let client_key = self
            .local_key
            .clone()
            .ok_or_else(|| GssError::invalid_state("initiator key disposed"))?;
        let target_key = self
            .realm
            .key(&target.value)
            .ok_or_else(|| GssError::failure(format!("target {} unknown to realm", target.value)))?;

        let mut rng = rand::thread_rng();
        rng.fill_bytes(&mut self.nonce);
        self.send_seq = rng.gen_range(0..1u32 << 30);

        let mut token = vec![TOK_INIT, encode_flags(&self.requested)];
        token.extend_from_slice(&self.send_seq.to_be_bytes());
        token.extend_from_slice(&self.lifetime.as_secs().to_be_bytes());
        token.extend_from_slice(&self.nonce);
        put_string(&mut token, &client.value)?;
        put_string(&mut token, &target.value)?;
        token.extend_from_slice(&self.binding_digest());

        let client_tag = hmac(&client_key, &[&token])?;
        token.extend_from_slice(&client_tag);
        let target_tag = hmac(&target_key, &[&token])?;
        token.extend_from_slice(&target_tag);

        self.session_key = Some(derive_session_key(&target_key, &self.nonce)?);
        self.received = Some(SequenceTracker::new(self.send_seq));

        if self.requested.mutual_auth {
            self.stage = Stage::AwaitingReply;
        } else {
            let negotiated = Self::negotiate(&self.requested);
            self.establish(negotiated);
        }
        self.seal(token)
    }

    fn process_reply(&mut self, input: &[u8]) -> GssResult<Vec<u8>> {
        let body = self.open(input)?;
        let mut reader = WireReader::new(body, "loopback reply token");
        if reader.u8()? != TOK_REPLY {
            return Err(GssError::malformed("expected loopback reply token"));
        }
        let acceptor_seq = reader.u32()?;
        let tag = reader.bytes(TAG_LEN)?;
        reader.finish()?;

        let expected = hmac(
            self.session_key()?,
            &[b"reply", &self.nonce, &acceptor_seq.to_be_bytes()],
        )?;
        if expected.as_slice() != tag {
            return Err(GssError::failure("loopback reply failed verification"));
        }

        self.received = Some(SequenceTracker::new(acceptor_seq));
        let negotiated = Self::negotiate(&self.requested);
        self.establish(negotiated);
        Ok(Vec::new())
    }

    // ===== ACCEPTOR =====

    fn accept_initial(&mut self, input: &[u8]) -> GssResult<Vec<u8>> {
        let body = self.open(input)?;
        let mut reader = WireReader::new(body, "loopback initial token");
        if reader.u8()? != TOK_INIT {
            return Err(GssError::malformed("expected loopback initial token"));
        }
        let flags = decode_flags(reader.u8()?);
        let initiator_seq = reader.u32()?;
        let lifetime = Lifetime::from_secs(reader.u32()?);
        self.nonce.copy_from_slice(reader.bytes(NONCE_LEN)?);
        let client = reader.string()?;
        let target = reader.string()?;
        let digest = reader.bytes(32)?;
        let signed_len = body.len() - reader.remaining();
        let client_tag = reader.bytes(TAG_LEN)?;
        let target_tag = reader.bytes(TAG_LEN)?;
        reader.finish()?;

        if let Some(local) = &self.local_name {
            if local.value != target {
                return Err(GssError::no_credential(
                    Some(&LOOPBACK_MECHANISM),
                    Some(CredentialUsage::AcceptOnly),
                ));
            }
        }
        let target_key = match &self.local_key {
            Some(key) => key.clone(),
            None => self.realm.key(&target).ok_or_else(|| {
                GssError::no_credential(
                    Some(&LOOPBACK_MECHANISM),
                    Some(CredentialUsage::AcceptOnly),
                )
            })?,
        };
        let client_key = self
            .realm
            .key(&client)
            .ok_or_else(|| GssError::failure(format!("client {client} unknown to realm")))?;

        let signed = &body[..signed_len];
        if hmac(&client_key, &[signed])?.as_slice() != client_tag {
            return Err(GssError::failure("loopback initiator tag failed verification"));
        }
        let outer = &body[..signed_len + TAG_LEN];
        if hmac(&target_key, &[outer])?.as_slice() != target_tag {
            return Err(GssError::failure("loopback target tag failed verification"));
        }
        if self.binding.is_some() && self.binding_digest().as_slice() != digest {
            return Err(GssError::failure("channel binding mismatch"));
        }

        self.session_key = Some(derive_session_key(&target_key, &self.nonce)?);
        self.received = Some(SequenceTracker::new(initiator_seq));
        self.lifetime = lifetime;
        self.local_name = Some(Arc::new(LoopbackName::user(&target)));
        self.peer_name = Some(Arc::new(LoopbackName::user(&client)));

        if flags.credential_delegation {
            self.delegated = Some(Arc::new(LoopbackCredential::new(
                Arc::new(LoopbackName::user(&client)),
                client_key,
                (lifetime, Lifetime::DEFAULT),
                (true, false),
            )));
        }

        let negotiated = Self::negotiate(&flags);
        if !flags.mutual_auth {
            self.send_seq = initiator_seq;
            self.establish(negotiated);
            return Ok(Vec::new());
        }

        self.send_seq = rand::thread_rng().gen_range(0..1u32 << 30);
        let mut reply = vec![TOK_REPLY];
        reply.extend_from_slice(&self.send_seq.to_be_bytes());
        let tag = hmac(
            self.session_key()?,
            &[b"reply", &self.nonce, &self.send_seq.to_be_bytes()],
        )?;
        reply.extend_from_slice(&tag);
        self.establish(negotiated);
        self.seal(reply)
    }

    // ===== PER-MESSAGE =====

    fn classify(&mut self, seq: u32) -> SupplementaryStatus {
        let flags = self.flags();
        if !(flags.replay_detection || flags.sequence_detection) {
            return SupplementaryStatus::InOrder;
        }
        match self.received.as_mut() {
            Some(tracker) => tracker.classify(seq),
            None => SupplementaryStatus::InOrder,
        }
    }

    fn next_seq(&mut self) -> u32 {
        let seq = self.send_seq;
        self.send_seq = self.send_seq.wrapping_add(1);
        seq
    }

    /// Parse and authenticate a per-message token of `kind`.
    fn check_message<'a>(
        &self,
        kind: u8,
        token: &'a [u8],
        extra: &[u8],
    ) -> GssResult<(u32, &'a [u8])> {
        if token.len() < 1 + 1 + 4 + TAG_LEN {
            return Err(GssError::malformed("truncated loopback message token"));
        }
        let (signed, tag) = token.split_at(token.len() - TAG_LEN);
        let mut reader = WireReader::new(signed, "loopback message token");
        if reader.u8()? != kind {
            return Err(GssError::malformed("unexpected loopback message token type"));
        }
        if reader.u8()? != self.peer_direction() {
            return Err(GssError::failure("loopback message token reflected"));
        }
        let seq = reader.u32()?;
        if hmac(self.session_key()?, &[signed, extra])?.as_slice() != tag {
            return Err(GssError::failure("loopback message token failed verification"));
        }
        Ok((seq, reader.rest()))
    }

    // ===== TRANSFER =====

    fn import(realm: LoopbackRealm, body: &[u8]) -> GssResult<Self> {
        let mut reader = WireReader::new(body, "loopback export token");
        let initiator = reader.u8()? == 1;
        let flags = decode_flags(reader.u8()?);
        let lifetime = Lifetime::from_secs(reader.u32()?);
        let send_seq = reader.u32()?;
        let next_expected = reader.u32()?;
        let auth_time = reader.u64()?;
        let local = reader.string()?;
        let peer = reader.string()?;
        let key = Zeroizing::new(reader.bytes(KEY_LEN)?.to_vec());
        reader.finish()?;

        let mut context = Self::new(realm, true, initiator);
        context.lifetime = lifetime;
        context.send_seq = send_seq;
        context.received = Some(SequenceTracker::new(next_expected));
        context.local_name = Some(Arc::new(LoopbackName::user(&local)));
        context.peer_name = Some(Arc::new(LoopbackName::user(&peer)));
        context.session_key = Some(key);
        context.negotiated = Some(flags);
        context.requested = flags;
        context.stage = Stage::Established;
        context.auth_time = auth_time;
        Ok(context)
    }
}

impl fmt::Debug for LoopbackContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackContext")
            .field("initiator", &self.initiator)
            .field("native", &self.native)
            .field("stage", &self.stage)
            .field("local", &self.local_name.as_ref().map(|n| n.value.clone()))
            .field("peer", &self.peer_name.as_ref().map(|n| n.value.clone()))
            .finish()
    }
}

impl MechanismContext for LoopbackContext {
    fn mechanism(&self) -> Oid {
        LOOPBACK_MECHANISM
    }

    fn is_native(&self) -> bool {
        self.native
    }

    fn request_flags(&mut self, flags: &RequestFlags) -> GssResult<()> {
        if self.stage != Stage::Start {
            return Err(GssError::invalid_state("flags must be requested before the first token"));
        }
        self.requested = *flags;
        Ok(())
    }

    fn set_channel_binding(&mut self, binding: &ChannelBinding) -> GssResult<()> {
        self.binding = Some(binding.clone());
        Ok(())
    }

    fn step(&mut self, input: &[u8]) -> GssResult<Vec<u8>> {
        match (self.initiator, self.stage) {
            (true, Stage::Start) => self.initial_token(),
            (true, Stage::AwaitingReply) => self.process_reply(input),
            (false, Stage::Start) => self.accept_initial(input),
            _ => Err(GssError::invalid_state("loopback handshake already complete")),
        }
    }

    fn is_established(&self) -> bool {
        self.stage == Stage::Established
    }

    fn is_protection_ready(&self) -> bool {
        self.session_key.is_some()
    }

    fn is_transferable(&self) -> bool {
        self.native && self.stage == Stage::Established
    }

    fn is_initiator(&self) -> bool {
        self.initiator
    }

    fn flags(&self) -> RequestFlags {
        self.negotiated.unwrap_or(self.requested)
    }

    fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    fn source_name(&self) -> Option<NameRef> {
        let name = if self.initiator {
            &self.local_name
        } else {
            &self.peer_name
        };
        name.clone().map(|n| n as NameRef)
    }

    fn target_name(&self) -> Option<NameRef> {
        let name = if self.initiator {
            &self.peer_name
        } else {
            &self.local_name
        };
        name.clone().map(|n| n as NameRef)
    }

    fn delegated_credential(&self) -> Option<CredentialElementRef> {
        self.delegated.clone()
    }

    fn wrap_size_limit(
        &self,
        _qop: u32,
        _confidential: bool,
        max_token_size: usize,
    ) -> GssResult<usize> {
        Ok(max_token_size.saturating_sub(WRAP_OVERHEAD))
    }

    fn protect(&mut self, message: &[u8], prop: &mut MessageProp) -> GssResult<Vec<u8>> {
        let privacy = prop.privacy && self.flags().confidentiality;
        let key = self.session_key()?.to_vec();
        let seq = self.next_seq();

        let mut token = vec![TOK_WRAP, self.direction()];
        token.extend_from_slice(&seq.to_be_bytes());
        token.push(u8::from(privacy));
        if privacy {
            token.extend_from_slice(&keystream_xor(&key, seq, message)?);
        } else {
            token.extend_from_slice(message);
        }
        let tag = hmac(&key, &[&token, &[]])?;
        token.extend_from_slice(&tag);

        prop.privacy = privacy;
        Ok(token)
    }

    fn unprotect(&mut self, token: &[u8], prop: &mut MessageProp) -> GssResult<Vec<u8>> {
        let (seq, rest) = self.check_message(TOK_WRAP, token, &[])?;
        let (&privacy, payload) = rest
            .split_first()
            .ok_or_else(|| GssError::malformed("truncated loopback wrap token"))?;
        let message = if privacy == 1 {
            keystream_xor(self.session_key()?, seq, payload)?
        } else {
            payload.to_vec()
        };

        prop.privacy = privacy == 1;
        prop.supplementary = self.classify(seq);
        Ok(message)
    }

    fn sign(&mut self, message: &[u8], _prop: &mut MessageProp) -> GssResult<Vec<u8>> {
        let key = self.session_key()?.to_vec();
        let seq = self.next_seq();
        let mut token = vec![TOK_MIC, self.direction()];
        token.extend_from_slice(&seq.to_be_bytes());
        let tag = hmac(&key, &[&token, message])?;
        token.extend_from_slice(&tag);
        Ok(token)
    }

    fn verify(&mut self, token: &[u8], message: &[u8], prop: &mut MessageProp) -> GssResult<()> {
        let (seq, rest) = self.check_message(TOK_MIC, token, message)?;
        if !rest.is_empty() {
            return Err(GssError::malformed("trailing bytes in loopback MIC token"));
        }
        prop.privacy = false;
        prop.supplementary = self.classify(seq);
        Ok(())
    }

    fn export(&mut self) -> GssResult<Vec<u8>> {
        if !self.is_transferable() {
            return Err(GssError::invalid_state("loopback context is not transferable"));
        }
        let next_expected = self
            .received
            .as_ref()
            .map_or(0, |t| t.expected_number() as u32);
        let local = self.local_name.as_ref().map(|n| n.value.clone()).unwrap_or_default();
        let peer = self.peer_name.as_ref().map(|n| n.value.clone()).unwrap_or_default();

        let mut token = EXPORT_MAGIC.to_vec();
        token.push(u8::from(self.initiator));
        token.push(encode_flags(&self.flags()));
        token.extend_from_slice(&self.lifetime.as_secs().to_be_bytes());
        token.extend_from_slice(&self.send_seq.to_be_bytes());
        token.extend_from_slice(&next_expected.to_be_bytes());
        token.extend_from_slice(&self.auth_time.to_be_bytes());
        put_string(&mut token, &local)?;
        put_string(&mut token, &peer)?;
        token.extend_from_slice(self.session_key()?);

        self.dispose();
        Ok(token)
    }

    fn inquire(&self, kind: InquireType) -> GssResult<InquireValue> {
        match kind {
            InquireType::SessionKey => Ok(InquireValue::Key(self.session_key()?.to_vec())),
            InquireType::TicketFlags => {
                let f = self.flags();
                Ok(InquireValue::Flags(vec![
                    f.confidentiality,
                    f.integrity,
                    f.mutual_auth,
                    f.replay_detection,
                    f.sequence_detection,
                    f.credential_delegation,
                ]))
            }
            InquireType::AuthTime if self.stage == Stage::Established => {
                Ok(InquireValue::Timestamp(self.auth_time))
            }
            InquireType::AuthTime => Err(GssError::invalid_state("not yet authenticated")),
        }
    }

    fn dispose(&mut self) {
        self.session_key = None;
        self.local_key = None;
        self.delegated = None;
        self.stage = Stage::Closed;
    }
}

// =============================================================================
// PRIMITIVES
// =============================================================================

fn hmac(key: &[u8], parts: &[&[u8]]) -> GssResult<[u8; TAG_LEN]> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|_| GssError::failure("invalid loopback key length"))?;
    for part in parts {
        mac.update(part);
    }
    let mut out = [0u8; TAG_LEN];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

fn derive_session_key(target_key: &[u8], nonce: &[u8]) -> GssResult<Key> {
    Ok(Zeroizing::new(hmac(target_key, &[b"session", nonce])?.to_vec()))
}

fn keystream_xor(key: &[u8], seq: u32, data: &[u8]) -> GssResult<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len());
    for (block, chunk) in data.chunks(TAG_LEN).enumerate() {
        let pad = hmac(key, &[b"enc", &seq.to_be_bytes(), &(block as u64).to_be_bytes()])?;
        out.extend(chunk.iter().zip(pad.iter()).map(|(d, p)| d ^ p));
    }
    Ok(out)
}

fn binding_digest(binding: &ChannelBinding) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in [&binding.initiator_address, &binding.acceptor_address] {
        match part {
            Some(address) => {
                hasher.update([1u8]);
                hasher.update((address.len() as u32).to_be_bytes());
                hasher.update(address);
            }
            None => hasher.update([0u8]),
        }
    }
    hasher.update(&binding.application_data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

fn encode_flags(flags: &RequestFlags) -> u8 {
    [
        flags.confidentiality,
        flags.integrity,
        flags.mutual_auth,
        flags.replay_detection,
        flags.sequence_detection,
        flags.credential_delegation,
        flags.anonymity,
        flags.delegation_policy,
    ]
    .iter()
    .enumerate()
    .fold(0u8, |acc, (bit, &set)| acc | (u8::from(set) << bit))
}

fn decode_flags(bits: u8) -> RequestFlags {
    let set = |bit: u8| bits & (1 << bit) != 0;
    RequestFlags {
        confidentiality: set(0),
        integrity: set(1),
        mutual_auth: set(2),
        replay_detection: set(3),
        sequence_detection: set(4),
        credential_delegation: set(5),
        anonymity: set(6),
        delegation_policy: set(7),
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
