//! # Token Header Codec
//!
//! Mechanism-independent framing of context-establishment tokens
//! (RFC 2743 §3.1):
//!
//! ```text
//! 0x60 || DER length || DER(mechanism OID) || mechanism token
//! ```
//!
//! The DER length covers the encoded OID plus the mechanism token. The codec
//! is pure: it never looks inside the mechanism token.

use gss_types::{der_length_octets, GssError, GssResult, Oid, DER_OID_TAG};
use std::io::{self, Read};

/// Tag of an InitialContextToken (`[APPLICATION 0]`, constructed).
pub const TOKEN_ID: u8 = 0x60;

/// Largest number of octets a long-form length may use.
pub const MAX_LENGTH_OCTETS: usize = 4;

/// Worst-case size of the length field, used when sizing tokens ahead of time.
const LENGTH_FIELD_ALLOWANCE: usize = 1 + MAX_LENGTH_OCTETS;

/// Indefinite-length marker, not permitted in DER.
const INDEFINITE_LENGTH: u8 = 0x80;

/// A decoded or to-be-encoded token header.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenHeader {
    mechanism: Oid,
    mechanism_token_len: usize,
}

impl TokenHeader {
    pub fn new(mechanism: Oid, mechanism_token_len: usize) -> Self {
        Self {
            mechanism,
            mechanism_token_len,
        }
    }

    /// Mechanism that produced the framed token.
    pub fn mechanism(&self) -> &Oid {
        &self.mechanism
    }

    /// Length of the mechanism token that follows the header.
    pub fn mechanism_token_len(&self) -> usize {
        self.mechanism_token_len
    }

    /// Value of the outer DER length field.
    fn declared_len(&self) -> usize {
        self.mechanism.der_len() + self.mechanism_token_len
    }

    /// Size of the encoded header alone.
    pub fn header_len(&self) -> usize {
        1 + der_length_octets(self.declared_len()) + self.mechanism.der_len()
    }

    /// Append the encoded header to `out`, returning the bytes written.
    ///
    /// Fails when the declared length does not fit in four length octets.
    pub fn encode_to(&self, out: &mut Vec<u8>) -> GssResult<usize> {
        let declared = self
            .mechanism
            .der_len()
            .checked_add(self.mechanism_token_len)
            .ok_or_else(|| GssError::failure("token length overflow"))?;
        if u64::try_from(declared).map_or(true, |len| len > u64::from(u32::MAX)) {
            return Err(GssError::failure(format!(
                "token length {declared} exceeds the {MAX_LENGTH_OCTETS}-octet length field"
            )));
        }

        let before = out.len();
        out.push(TOKEN_ID);
        put_length(out, declared);
        out.extend_from_slice(&self.mechanism.to_der());
        Ok(out.len() - before)
    }

    /// Encoded header as a fresh buffer.
    pub fn encode(&self) -> GssResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.header_len());
        self.encode_to(&mut out)?;
        Ok(out)
    }

    /// Read a header from `reader`, leaving it positioned at the first byte
    /// of the mechanism token.
    pub fn decode<R: Read>(reader: &mut R) -> GssResult<Self> {
        let tag = read_byte(reader)?;
        if tag != TOKEN_ID {
            return Err(GssError::malformed(format!(
                "token header tag {tag:#04x}, expected {TOKEN_ID:#04x}"
            )));
        }

        let (declared, _) = read_length(reader)?;

        let oid_tag = read_byte(reader)?;
        if oid_tag != DER_OID_TAG {
            return Err(GssError::malformed(format!(
                "mechanism identifier tag {oid_tag:#04x}, expected {DER_OID_TAG:#04x}"
            )));
        }
        // Count the length octets as sent, minimal or not
        let (content_len, length_octets) = read_length(reader)?;
        let oid_len = 1 + length_octets + content_len;
        if oid_len > declared {
            return Err(GssError::malformed(format!(
                "mechanism identifier ({oid_len} bytes) overruns declared length {declared}"
            )));
        }
        // Read through `take` so a hostile length cannot force a large allocation
        let mut content = Vec::new();
        reader
            .by_ref()
            .take(content_len as u64)
            .read_to_end(&mut content)
            .map_err(truncated)?;
        if content.len() != content_len {
            return Err(GssError::malformed("truncated token header"));
        }
        let mechanism = Oid::from_content(&content)?;

        Ok(Self {
            mechanism,
            mechanism_token_len: declared - oid_len,
        })
    }

    /// Split a complete framed token into its header and mechanism token.
    ///
    /// The body must be exactly as long as the header declares.
    pub fn split(token: &[u8]) -> GssResult<(Self, &[u8])> {
        let mut cursor = token;
        let header = Self::decode(&mut cursor)?;
        if cursor.len() != header.mechanism_token_len {
            return Err(GssError::malformed(format!(
                "header declares a {}-byte mechanism token, found {}",
                header.mechanism_token_len,
                cursor.len()
            )));
        }
        Ok((header, cursor))
    }

    /// Prefix `token` with a header for `mechanism`.
    pub fn frame(mechanism: &Oid, token: &[u8]) -> GssResult<Vec<u8>> {
        let header = Self::new(mechanism.clone(), token.len());
        let mut out = Vec::with_capacity(header.header_len() + token.len());
        header.encode_to(&mut out)?;
        out.extend_from_slice(token);
        Ok(out)
    }

    /// Largest mechanism token that, once framed for `mechanism`, still fits
    /// in `max_total_size` bytes.
    pub fn max_mechanism_token_size(mechanism: &Oid, max_total_size: usize) -> usize {
        max_total_size
            .saturating_sub(1 + mechanism.der_len())
            .saturating_sub(LENGTH_FIELD_ALLOWANCE)
    }
}

fn put_length(out: &mut Vec<u8>, len: usize) {
    match der_length_octets(len) {
        1 => out.push(len as u8),
        n => {
            let octets = n - 1;
            out.push(0x80 | octets as u8);
            for shift in (0..octets).rev() {
                out.push((len >> (8 * shift)) as u8);
            }
        }
    }
}

/// Definite length and the number of octets it occupied.
fn read_length<R: Read>(reader: &mut R) -> GssResult<(usize, usize)> {
    let first = read_byte(reader)?;
    if first & 0x80 == 0 {
        return Ok((usize::from(first), 1));
    }
    if first == INDEFINITE_LENGTH {
        return Err(GssError::malformed("indefinite length in token header"));
    }
    let octets = usize::from(first & 0x7f);
    if octets > MAX_LENGTH_OCTETS {
        return Err(GssError::malformed(format!(
            "length field uses {octets} octets, at most {MAX_LENGTH_OCTETS} allowed"
        )));
    }
    let mut len = 0usize;
    for _ in 0..octets {
        len = (len << 8) | usize::from(read_byte(reader)?);
    }
    Ok((len, 1 + octets))
}

fn read_byte<R: Read>(reader: &mut R) -> GssResult<u8> {
    let mut byte = [0u8; 1];
    reader.read_exact(&mut byte).map_err(truncated)?;
    Ok(byte[0])
}

fn truncated(err: io::Error) -> GssError {
    match err.kind() {
        io::ErrorKind::UnexpectedEof => GssError::malformed("truncated token header"),
        _ => GssError::malformed(format!("unreadable token header: {err}")),
    }
}
