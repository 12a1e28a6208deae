//! # Object Identifiers
//!
//! Mechanisms and name types are named by ASN.1 object identifiers. An
//! [`Oid`] keeps the DER *content* octets, which makes equality, ordering and
//! DER encoding trivial, and lets well-known identifiers be `const`.

use crate::errors::{GssError, GssResult};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// DER universal tag for OBJECT IDENTIFIER.
pub const DER_OID_TAG: u8 = 0x06;

/// An ASN.1 object identifier.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, SerializeDisplay, DeserializeFromStr)]
pub struct Oid(Cow<'static, [u8]>);

impl Oid {
    // =========================================================================
    // Mechanisms
    // =========================================================================

    /// Kerberos v5 (1.2.840.113554.1.2.2).
    pub const KRB5: Oid = Oid::from_static(&[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x12, 0x01, 0x02, 0x02]);

    /// SPNEGO pseudo-mechanism (1.3.6.1.5.5.2).
    pub const SPNEGO: Oid = Oid::from_static(&[0x2b, 0x06, 0x01, 0x05, 0x05, 0x02]);

    // =========================================================================
    // Name types
    // =========================================================================

    /// GSS_C_NT_USER_NAME (1.2.840.113554.1.2.1.1).
    pub const NT_USER_NAME: Oid =
        Oid::from_static(&[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x12, 0x01, 0x02, 0x01, 0x01]);

    /// GSS_C_NT_HOSTBASED_SERVICE (1.2.840.113554.1.2.1.4).
    pub const NT_HOSTBASED_SERVICE: Oid =
        Oid::from_static(&[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x12, 0x01, 0x02, 0x01, 0x04]);

    /// Legacy GSS_C_NT_HOSTBASED_SERVICE_X (1.3.6.1.5.6.2) from RFC 2078.
    pub const NT_HOSTBASED_SERVICE_X: Oid =
        Oid::from_static(&[0x2b, 0x06, 0x01, 0x05, 0x06, 0x02]);

    /// GSS_C_NT_ANONYMOUS (1.3.6.1.5.6.3).
    pub const NT_ANONYMOUS: Oid = Oid::from_static(&[0x2b, 0x06, 0x01, 0x05, 0x06, 0x03]);

    /// GSS_C_NT_EXPORT_NAME (1.3.6.1.5.6.4).
    pub const NT_EXPORT_NAME: Oid = Oid::from_static(&[0x2b, 0x06, 0x01, 0x05, 0x06, 0x04]);

    /// Kerberos principal name type (1.2.840.113554.1.2.2.1).
    pub const KRB5_PRINCIPAL_NAME: Oid =
        Oid::from_static(&[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x12, 0x01, 0x02, 0x02, 0x01]);

    /// Wrap pre-validated DER content octets.
    pub const fn from_static(content: &'static [u8]) -> Self {
        Oid(Cow::Borrowed(content))
    }

    /// Build from DER content octets (the bytes after tag and length).
    pub fn from_content(content: &[u8]) -> GssResult<Self> {
        validate_content(content)?;
        Ok(Oid(Cow::Owned(content.to_vec())))
    }

    /// Build from arcs, e.g. `[1, 2, 840, 113554, 1, 2, 2]`.
    pub fn from_arcs(arcs: &[u64]) -> GssResult<Self> {
        if arcs.len() < 2 {
            return Err(GssError::malformed("object identifier needs at least two arcs"));
        }
        if arcs[0] > 2 || (arcs[0] < 2 && arcs[1] >= 40) {
            return Err(GssError::malformed(format!(
                "invalid leading arcs {}.{}",
                arcs[0], arcs[1]
            )));
        }
        let first = arcs[0]
            .checked_mul(40)
            .and_then(|v| v.checked_add(arcs[1]))
            .ok_or_else(|| GssError::malformed("object identifier arc overflow"))?;

        let mut content = Vec::with_capacity(arcs.len() + 4);
        push_base128(&mut content, first);
        for &arc in &arcs[2..] {
            push_base128(&mut content, arc);
        }
        Ok(Oid(Cow::Owned(content)))
    }

    /// DER content octets.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Decoded arcs.
    pub fn arcs(&self) -> Vec<u64> {
        let mut arcs = Vec::with_capacity(self.0.len() + 1);
        let mut value: u64 = 0;
        for &byte in self.0.iter() {
            value = (value << 7) | u64::from(byte & 0x7f);
            if byte & 0x80 == 0 {
                if arcs.is_empty() {
                    let (a, b) = match value {
                        v if v < 40 => (0, v),
                        v if v < 80 => (1, v - 40),
                        v => (2, v - 80),
                    };
                    arcs.push(a);
                    arcs.push(b);
                } else {
                    arcs.push(value);
                }
                value = 0;
            }
        }
        arcs
    }

    /// Size of the full DER encoding (tag + length + content).
    pub fn der_len(&self) -> usize {
        1 + der_length_octets(self.0.len()) + self.0.len()
    }

    /// Full DER encoding: `0x06 || length || content`.
    pub fn to_der(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.der_len());
        out.push(DER_OID_TAG);
        push_der_length(&mut out, self.0.len());
        out.extend_from_slice(&self.0);
        out
    }

    /// Parse a complete DER encoding. Trailing bytes are rejected.
    pub fn from_der(bytes: &[u8]) -> GssResult<Self> {
        let (&tag, rest) = bytes
            .split_first()
            .ok_or_else(|| GssError::malformed("empty object identifier encoding"))?;
        if tag != DER_OID_TAG {
            return Err(GssError::malformed(format!(
                "expected OBJECT IDENTIFIER tag 0x06, found {tag:#04x}"
            )));
        }
        let (&first, rest) = rest
            .split_first()
            .ok_or_else(|| GssError::malformed("truncated object identifier length"))?;
        let (len, rest) = if first & 0x80 == 0 {
            (usize::from(first), rest)
        } else {
            let count = usize::from(first & 0x7f);
            if count == 0 || count > 4 || rest.len() < count {
                return Err(GssError::malformed("bad object identifier length"));
            }
            let len = rest[..count]
                .iter()
                .fold(0usize, |acc, &b| (acc << 8) | usize::from(b));
            (len, &rest[count..])
        };
        if rest.len() != len {
            return Err(GssError::malformed(format!(
                "object identifier declares {len} content bytes, found {}",
                rest.len()
            )));
        }
        Self::from_content(rest)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arcs = self.arcs();
        let mut first = true;
        for arc in arcs {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{arc}")?;
            first = false;
        }
        Ok(())
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({self})")
    }
}

impl FromStr for Oid {
    type Err = GssError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let arcs = s
            .trim()
            .split('.')
            .map(|part| {
                part.parse::<u64>()
                    .map_err(|_| GssError::malformed(format!("invalid object identifier {s:?}")))
            })
            .collect::<GssResult<Vec<u64>>>()?;
        Self::from_arcs(&arcs)
    }
}

/// Number of octets the DER length field takes for `len`.
pub fn der_length_octets(len: usize) -> usize {
    match len {
        0..=0x7f => 1,
        0x80..=0xff => 2,
        0x100..=0xffff => 3,
        0x1_0000..=0xff_ffff => 4,
        _ => 5,
    }
}

fn push_der_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let bytes = (len as u64).to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    out.push(0x80 | (bytes.len() - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
}

fn push_base128(out: &mut Vec<u8>, mut value: u64) {
    let mut groups = [0u8; 10];
    let mut n = 0;
    loop {
        groups[n] = (value & 0x7f) as u8;
        n += 1;
        value >>= 7;
        if value == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        let continuation = if i == 0 { 0 } else { 0x80 };
        out.push(groups[i] | continuation);
    }
}

fn validate_content(content: &[u8]) -> GssResult<()> {
    let Some(&last) = content.last() else {
        return Err(GssError::malformed("empty object identifier"));
    };
    if last & 0x80 != 0 {
        return Err(GssError::malformed("object identifier ends mid sub-identifier"));
    }
    let mut at_start = true;
    let mut group_len = 0usize;
    for &byte in content {
        if at_start && byte == 0x80 {
            return Err(GssError::malformed("non-minimal sub-identifier encoding"));
        }
        group_len += 1;
        if group_len > 9 {
            return Err(GssError::malformed("sub-identifier exceeds 63 bits"));
        }
        at_start = byte & 0x80 == 0;
        if at_start {
            group_len = 0;
        }
    }
    Ok(())
}
