//! # Domain Entities
//!
//! Plain data exchanged between applications, the negotiation core and the
//! mechanisms.

use crate::oid::Oid;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// CREDENTIAL USAGE
// =============================================================================

/// Direction(s) a credential element may be used in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CredentialUsage {
    InitiateAndAccept,
    InitiateOnly,
    AcceptOnly,
}

impl CredentialUsage {
    /// Single-direction usage for an initiator (`true`) or acceptor lookup.
    pub fn single(initiate: bool) -> Self {
        if initiate {
            CredentialUsage::InitiateOnly
        } else {
            CredentialUsage::AcceptOnly
        }
    }

    pub fn can_initiate(self) -> bool {
        matches!(
            self,
            CredentialUsage::InitiateOnly | CredentialUsage::InitiateAndAccept
        )
    }

    pub fn can_accept(self) -> bool {
        matches!(
            self,
            CredentialUsage::AcceptOnly | CredentialUsage::InitiateAndAccept
        )
    }

    /// Usage from the two capabilities of an element.
    pub fn from_capabilities(initiate: bool, accept: bool) -> Option<Self> {
        match (initiate, accept) {
            (true, true) => Some(CredentialUsage::InitiateAndAccept),
            (true, false) => Some(CredentialUsage::InitiateOnly),
            (false, true) => Some(CredentialUsage::AcceptOnly),
            (false, false) => None,
        }
    }
}

impl fmt::Display for CredentialUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CredentialUsage::InitiateAndAccept => "Initiate And Accept",
            CredentialUsage::InitiateOnly => "Initiate Only",
            CredentialUsage::AcceptOnly => "Accept Only",
        };
        f.write_str(label)
    }
}

// =============================================================================
// LIFETIME
// =============================================================================

/// Lifetime in seconds.
///
/// `DEFAULT` asks the mechanism to pick; `INDEFINITE` never expires. Ordering
/// is numeric, so the minimum across elements is the remaining lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Lifetime(u32);

impl Lifetime {
    pub const DEFAULT: Lifetime = Lifetime(0);
    pub const INDEFINITE: Lifetime = Lifetime(u32::MAX);

    pub const fn from_secs(secs: u32) -> Self {
        Lifetime(secs)
    }

    pub const fn as_secs(self) -> u32 {
        self.0
    }

    pub fn is_indefinite(self) -> bool {
        self == Self::INDEFINITE
    }
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_indefinite() {
            f.write_str("indefinite")
        } else {
            write!(f, "{}s", self.0)
        }
    }
}

// =============================================================================
// NAMES
// =============================================================================

/// A principal name as seen by applications.
///
/// Parsing and canonicalisation belong to the mechanisms; the core only
/// carries the printable form and its name type around. A name produced by a
/// mechanism after authentication records that mechanism.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrincipalName {
    value: String,
    name_type: Oid,
    mechanism: Option<Oid>,
}

impl PrincipalName {
    pub fn new(value: impl Into<String>, name_type: Oid) -> Self {
        Self {
            value: value.into(),
            name_type,
            mechanism: None,
        }
    }

    /// A mechanism name: the canonical form one mechanism produced.
    pub fn mechanism_name(value: impl Into<String>, name_type: Oid, mechanism: Oid) -> Self {
        Self {
            value: value.into(),
            name_type,
            mechanism: Some(mechanism),
        }
    }

    pub fn anonymous() -> Self {
        Self::new("<anonymous>", Oid::NT_ANONYMOUS)
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn name_type(&self) -> &Oid {
        &self.name_type
    }

    pub fn mechanism(&self) -> Option<&Oid> {
        self.mechanism.as_ref()
    }

    pub fn is_anonymous(&self) -> bool {
        self.name_type == Oid::NT_ANONYMOUS
    }
}

impl fmt::Display for PrincipalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

// =============================================================================
// CONTEXT REQUESTS
// =============================================================================

/// Context characteristics an initiator asks for before negotiation.
///
/// Defaults follow the usual GSS-API expectations: protection services and
/// mutual authentication on, delegation and anonymity off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFlags {
    pub confidentiality: bool,
    pub integrity: bool,
    pub mutual_auth: bool,
    pub replay_detection: bool,
    pub sequence_detection: bool,
    pub credential_delegation: bool,
    pub anonymity: bool,
    pub delegation_policy: bool,
}

impl Default for RequestFlags {
    fn default() -> Self {
        Self {
            confidentiality: true,
            integrity: true,
            mutual_auth: true,
            replay_detection: true,
            sequence_detection: true,
            credential_delegation: false,
            anonymity: false,
            delegation_policy: false,
        }
    }
}

/// Channel bindings tying the context to an outer transport.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelBinding {
    pub initiator_address: Option<Vec<u8>>,
    pub acceptor_address: Option<Vec<u8>>,
    pub application_data: Vec<u8>,
}

impl ChannelBinding {
    pub fn with_application_data(data: impl Into<Vec<u8>>) -> Self {
        Self {
            application_data: data.into(),
            ..Self::default()
        }
    }
}

// =============================================================================
// PER-MESSAGE PROPERTIES
// =============================================================================

/// Ordering verdict for a received per-message token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SupplementaryStatus {
    /// The next expected token.
    #[default]
    InOrder,
    /// Already seen.
    Duplicate,
    /// Older than the tracked window; cannot tell whether it is a duplicate.
    Old,
    /// Inside the window but arriving after a later token.
    Unsequenced,
    /// Later than expected; one or more earlier tokens are missing.
    Gap,
}

impl SupplementaryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SupplementaryStatus::InOrder => "in_order",
            SupplementaryStatus::Duplicate => "duplicate",
            SupplementaryStatus::Old => "old",
            SupplementaryStatus::Unsequenced => "unsequenced",
            SupplementaryStatus::Gap => "gap",
        }
    }
}

/// Properties passed along with per-message protection calls.
///
/// Callers set `qop` and `privacy` before protecting; after unprotecting the
/// mechanism reports whether privacy was applied and the ordering status.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageProp {
    pub qop: u32,
    pub privacy: bool,
    pub supplementary: SupplementaryStatus,
    pub minor_status: Option<(i32, String)>,
}

impl MessageProp {
    pub fn new(qop: u32, privacy: bool) -> Self {
        Self {
            qop,
            privacy,
            ..Self::default()
        }
    }

    pub fn is_duplicate(&self) -> bool {
        self.supplementary == SupplementaryStatus::Duplicate
    }

    pub fn is_old(&self) -> bool {
        self.supplementary == SupplementaryStatus::Old
    }

    pub fn is_unsequenced(&self) -> bool {
        self.supplementary == SupplementaryStatus::Unsequenced
    }

    pub fn is_gap(&self) -> bool {
        self.supplementary == SupplementaryStatus::Gap
    }
}

// =============================================================================
// CONTEXT INQUIRY
// =============================================================================

/// Mechanism-specific attributes an established context can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InquireType {
    SessionKey,
    TicketFlags,
    AuthTime,
}

/// Answer to an [`InquireType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InquireValue {
    Key(Vec<u8>),
    Flags(Vec<bool>),
    Timestamp(u64),
}
