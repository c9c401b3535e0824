//! Canonical CBOR encoder.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// CBOR tag carried by [`Value::Link`].
pub const LINK_TAG: u64 = 1000;

/// Encodes a value to canonical CBOR bytes.
///
/// Integers and lengths use the shortest form, floats are always written
/// as 64-bit, links are tagged with [`LINK_TAG`].
///
/// # Errors
///
/// Returns [`CodecError::NaNForbidden`] for NaN floats.
pub fn to_canonical_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut encoder = CanonicalEncoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}

/// A canonical CBOR encoder.
///
/// Besides whole values it exposes the primitives (array headers, unsigned
/// integers, text) that higher layers use to frame composite records such
/// as write envelopes.
#[derive(Debug, Default)]
pub struct CanonicalEncoder {
    buffer: Vec<u8>,
}

impl CanonicalEncoder {
    /// Create a new encoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new encoder with the specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Encode a value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::NaNForbidden`] for NaN floats.
    pub fn encode(&mut self, value: &Value) -> CodecResult<()> {
        match value {
            Value::Bool(b) => self.encode_bool(*b),
            Value::Integer(n) => self.encode_integer(*n),
            Value::Float(x) => self.encode_float(*x)?,
            Value::Text(s) => self.encode_text(s),
            Value::Link(record) => {
                self.encode_head(6, LINK_TAG);
                self.encode_u64(*record);
            }
        }
        Ok(())
    }

    /// Writes the header of a definite-length array of `len` items.
    pub fn encode_array_header(&mut self, len: usize) {
        self.encode_head(4, len as u64);
    }

    /// Writes an unsigned integer.
    pub fn encode_u64(&mut self, n: u64) {
        self.encode_head(0, n);
    }

    /// Writes a text string.
    pub fn encode_text(&mut self, text: &str) {
        self.encode_head(3, text.len() as u64);
        self.buffer.extend_from_slice(text.as_bytes());
    }

    /// Writes a boolean.
    pub fn encode_bool(&mut self, b: bool) {
        self.buffer.push(if b { 0xf5 } else { 0xf4 });
    }

    /// Consume this encoder and return the encoded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get a reference to the encoded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    #[allow(clippy::cast_sign_loss)]
    fn encode_integer(&mut self, n: i64) {
        if n >= 0 {
            self.encode_head(0, n as u64);
        } else {
            // CBOR negative integers carry -(n+1)
            self.encode_head(1, (-(n + 1)) as u64);
        }
    }

    fn encode_float(&mut self, x: f64) -> CodecResult<()> {
        if x.is_nan() {
            return Err(CodecError::NaNForbidden);
        }
        self.buffer.push(0xfb);
        self.buffer.extend_from_slice(&x.to_be_bytes());
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn encode_head(&mut self, major_type: u8, value: u64) {
        let mt = major_type << 5;
        if value < 24 {
            self.buffer.push(mt | value as u8);
        } else if let Ok(v) = u8::try_from(value) {
            self.buffer.push(mt | 24);
            self.buffer.push(v);
        } else if let Ok(v) = u16::try_from(value) {
            self.buffer.push(mt | 25);
            self.buffer.extend_from_slice(&v.to_be_bytes());
        } else if let Ok(v) = u32::try_from(value) {
            self.buffer.push(mt | 26);
            self.buffer.extend_from_slice(&v.to_be_bytes());
        } else {
            self.buffer.push(mt | 27);
            self.buffer.extend_from_slice(&value.to_be_bytes());
        }
    }
}
