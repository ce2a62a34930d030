//! TLV8 record codec.
//!
//! Every record is `type: u8, length: u8, value: [u8; length]`. Values longer
//! than 255 bytes are split across consecutive records of the same type, and
//! the reader merges them back. A zero-length record of type `0x00` separates
//! repeated items of the same type.

pub mod integer;

pub use integer::{NarrowInt, decode_f32, decode_u8, decode_uint, encode_uint};

use crate::error::{AdaptiveLightError, Result};

pub const SEPARATOR: u8 = 0x00;

const MAX_FRAGMENT: usize = 255;

/// One decoded record with fragments merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlv {
    pub ty: u8,
    pub value: Vec<u8>,
}

impl Tlv {
    pub fn is_separator(&self) -> bool {
        self.ty == SEPARATOR && self.value.is_empty()
    }
}

/// Sequential reader over a TLV8 buffer.
pub struct TlvReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> TlvReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn read_fragment(&mut self) -> Result<(u8, &'a [u8])> {
        let header = self
            .bytes
            .get(self.pos..self.pos + 2)
            .ok_or_else(|| AdaptiveLightError::invalid("truncated TLV header"))?;
        let (ty, len) = (header[0], header[1] as usize);
        let start = self.pos + 2;
        let value = self
            .bytes
            .get(start..start + len)
            .ok_or_else(|| AdaptiveLightError::invalid(format!("truncated TLV 0x{ty:02X}")))?;
        self.pos = start + len;
        Ok((ty, value))
    }

    /// Next record, or `None` at the end of the buffer.
    pub fn next_item(&mut self) -> Result<Option<Tlv>> {
        if self.pos >= self.bytes.len() {
            return Ok(None);
        }

        let (ty, first) = self.read_fragment()?;
        let mut value = first.to_vec();
        let mut last_len = first.len();

        // Continuation fragments follow a full-length fragment of the same type
        while last_len == MAX_FRAGMENT
            && self.pos < self.bytes.len()
            && self.bytes[self.pos] == ty
        {
            let (_, fragment) = self.read_fragment()?;
            value.extend_from_slice(fragment);
            last_len = fragment.len();
        }

        Ok(Some(Tlv { ty, value }))
    }

    /// Read every remaining record.
    pub fn read_all(mut self) -> Result<Vec<Tlv>> {
        let mut items = Vec::new();
        while let Some(item) = self.next_item()? {
            items.push(item);
        }
        Ok(items)
    }
}

/// Bounded TLV8 writer.
#[derive(Debug, Clone)]
pub struct TlvWriter {
    buf: Vec<u8>,
    limit: usize,
}

impl TlvWriter {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
        }
    }

    fn reserve(&self, additional: usize) -> Result<()> {
        if self.buf.len() + additional > self.limit {
            return Err(AdaptiveLightError::out_of_resources(format!(
                "TLV buffer full ({} of {} bytes used)",
                self.buf.len(),
                self.limit
            )));
        }
        Ok(())
    }

    pub fn append(&mut self, ty: u8, value: &[u8]) -> Result<()> {
        let fragments = value.len().div_ceil(MAX_FRAGMENT).max(1);
        self.reserve(value.len() + fragments * 2)?;

        if value.is_empty() {
            self.buf.extend_from_slice(&[ty, 0]);
            return Ok(());
        }
        for chunk in value.chunks(MAX_FRAGMENT) {
            self.buf.push(ty);
            self.buf.push(chunk.len() as u8);
            self.buf.extend_from_slice(chunk);
        }
        Ok(())
    }

    pub fn append_separator(&mut self) -> Result<()> {
        self.append(SEPARATOR, &[])
    }

    pub fn append_u8(&mut self, ty: u8, value: u8) -> Result<()> {
        self.append(ty, &[value])
    }

    pub fn append_uint(&mut self, ty: u8, value: u64) -> Result<()> {
        self.append(ty, &encode_uint(value))
    }

    pub fn append_f32(&mut self, ty: u8, value: f32) -> Result<()> {
        self.append(ty, &value.to_le_bytes())
    }

    pub fn append_narrow(&mut self, ty: u8, value: NarrowInt) -> Result<()> {
        self.append(ty, &value.to_bytes())
    }

    /// Build a nested container with `build` and append it as one record.
    pub fn append_nested<F>(&mut self, ty: u8, build: F) -> Result<()>
    where
        F: FnOnce(&mut TlvWriter) -> Result<()>,
    {
        let mut nested = TlvWriter::new(self.limit.saturating_sub(self.buf.len()));
        build(&mut nested)?;
        self.append(ty, &nested.buf)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
