//! Variable-width little-endian integers.

use serde::{Deserialize, Serialize};

use crate::error::{AdaptiveLightError, Result};

/// Decode an unsigned little-endian integer of 1 to 8 bytes.
pub fn decode_uint(bytes: &[u8]) -> Result<u64> {
    if bytes.is_empty() || bytes.len() > 8 {
        return Err(AdaptiveLightError::invalid(format!(
            "integer field has invalid length {}",
            bytes.len()
        )));
    }
    let mut raw = [0u8; 8];
    raw[..bytes.len()].copy_from_slice(bytes);
    Ok(u64::from_le_bytes(raw))
}

/// Encode `value` using the smallest of 1, 2, 4 or 8 bytes.
pub fn encode_uint(value: u64) -> Vec<u8> {
    let width = if value <= u8::MAX as u64 {
        1
    } else if value <= u16::MAX as u64 {
        2
    } else if value <= u32::MAX as u64 {
        4
    } else {
        8
    };
    value.to_le_bytes()[..width].to_vec()
}

pub fn decode_u8(bytes: &[u8]) -> Result<u8> {
    match bytes {
        [value] => Ok(*value),
        _ => Err(AdaptiveLightError::invalid(format!(
            "single-byte field has invalid length {}",
            bytes.len()
        ))),
    }
}

pub fn decode_f32(bytes: &[u8]) -> Result<f32> {
    let raw: [u8; 4] = bytes.try_into().map_err(|_| {
        AdaptiveLightError::invalid(format!("float field has invalid length {}", bytes.len()))
    })?;
    Ok(f32::from_le_bytes(raw))
}

/// A signed integer that remembers the width it was encoded with.
///
/// Controllers may send targets and source ranges in 1, 2, 3 or 4 bytes, and
/// expect them echoed back in exactly that width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrowInt {
    value: i32,
    width: u8,
}

impl NarrowInt {
    /// Decode a sign-extended little-endian integer of 1 to 4 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let width = bytes.len();
        if width == 0 || width > 4 {
            return Err(AdaptiveLightError::invalid(format!(
                "signed field has invalid length {width}"
            )));
        }
        let fill = if bytes[width - 1] & 0x80 != 0 { 0xFF } else { 0x00 };
        let mut raw = [fill; 4];
        raw[..width].copy_from_slice(bytes);
        Ok(Self {
            value: i32::from_le_bytes(raw),
            width: width as u8,
        })
    }

    /// Smallest of 1, 2 or 4 bytes that holds `value`.
    pub fn fit(value: i32) -> Self {
        let width = if i8::try_from(value).is_ok() {
            1
        } else if i16::try_from(value).is_ok() {
            2
        } else {
            4
        };
        Self { value, width }
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.value.to_le_bytes()[..self.width as usize].to_vec()
    }
}

impl From<NarrowInt> for i32 {
    fn from(n: NarrowInt) -> i32 {
        n.value
    }
}
