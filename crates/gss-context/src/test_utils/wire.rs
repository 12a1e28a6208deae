//! Byte-level helpers for the test mechanisms' token formats.

use gss_types::{GssError, GssResult};

/// Cursor over a received token; every read failure is a malformed token.
pub(crate) struct WireReader<'a> {
    buf: &'a [u8],
    what: &'static str,
}

impl<'a> WireReader<'a> {
    pub(crate) fn new(buf: &'a [u8], what: &'static str) -> Self {
        Self { buf, what }
    }

    pub(crate) fn bytes(&mut self, len: usize) -> GssResult<&'a [u8]> {
        if self.buf.len() < len {
            return Err(GssError::malformed(format!("truncated {}", self.what)));
        }
        let (head, rest) = self.buf.split_at(len);
        self.buf = rest;
        Ok(head)
    }

    pub(crate) fn u8(&mut self) -> GssResult<u8> {
        Ok(self.bytes(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> GssResult<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32(&mut self) -> GssResult<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn u64(&mut self) -> GssResult<u64> {
        let mut out = [0u8; 8];
        out.copy_from_slice(self.bytes(8)?);
        Ok(u64::from_be_bytes(out))
    }

    /// A `u16`-prefixed UTF-8 string.
    pub(crate) fn string(&mut self) -> GssResult<String> {
        let len = usize::from(self.u16()?);
        let raw = self.bytes(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| GssError::malformed(format!("non UTF-8 name in {}", self.what)))
    }

    /// A `u32`-prefixed byte string.
    pub(crate) fn blob(&mut self) -> GssResult<&'a [u8]> {
        let len = self.u32()? as usize;
        self.bytes(len)
    }

    pub(crate) fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.buf)
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn finish(&self) -> GssResult<()> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(GssError::malformed(format!("trailing bytes in {}", self.what)))
        }
    }
}

pub(crate) fn put_string(out: &mut Vec<u8>, value: &str) -> GssResult<()> {
    let len = u16::try_from(value.len())
        .map_err(|_| GssError::failure("name too long for token"))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

pub(crate) fn put_blob(out: &mut Vec<u8>, value: &[u8]) -> GssResult<()> {
    let len = u32::try_from(value.len())
        .map_err(|_| GssError::failure("payload too long for token"))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(value);
    Ok(())
}
