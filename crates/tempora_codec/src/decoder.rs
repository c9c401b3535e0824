//! Canonical CBOR decoder.

use crate::encoder::LINK_TAG;
use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Upper bound on declared text lengths and array sizes, so a corrupt
/// length cannot trigger a huge allocation.
const MAX_DECLARED_LENGTH: u64 = 64 * 1024 * 1024;

/// Decodes exactly one value from `bytes`.
///
/// # Errors
///
/// Returns an error if the bytes are not canonical CBOR for a [`Value`] or
/// if anything follows the value.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let mut decoder = CanonicalDecoder::new(bytes);
    let value = decoder.decode()?;
    decoder.finish()?;
    Ok(value)
}

/// A canonical CBOR decoder.
///
/// Rejects non-shortest integer heads, indefinite lengths, NaN and any
/// item with no [`Value`] counterpart.
#[derive(Debug)]
pub struct CanonicalDecoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> CanonicalDecoder<'a> {
    /// Create a new decoder for the given bytes.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Decode the next value.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed, non-canonical or unsupported input.
    pub fn decode(&mut self) -> CodecResult<Value> {
        let (major, info) = self.read_initial()?;
        match major {
            0 => {
                let n = self.read_argument(info)?;
                i64::try_from(n)
                    .map(Value::Integer)
                    .map_err(|_| CodecError::IntegerOverflow)
            }
            1 => {
                let n = self.read_argument(info)?;
                let n = i64::try_from(n).map_err(|_| CodecError::IntegerOverflow)?;
                Ok(Value::Integer(-1 - n))
            }
            3 => Ok(Value::Text(self.read_text_body(info)?)),
            6 => {
                let tag = self.read_argument(info)?;
                if tag != LINK_TAG {
                    return Err(CodecError::unsupported_type(format!("tag {tag}")));
                }
                Ok(Value::Link(self.decode_u64()?))
            }
            7 => self.decode_simple(info),
            2 => Err(CodecError::unsupported_type("byte string")),
            4 => Err(CodecError::unsupported_type("array")),
            5 => Err(CodecError::unsupported_type("map")),
            _ => Err(CodecError::invalid_structure("invalid major type")),
        }
    }

    /// Reads a definite array header and returns its length.
    ///
    /// # Errors
    ///
    /// Returns an error if the next item is not an array.
    pub fn decode_array_header(&mut self) -> CodecResult<usize> {
        let (major, info) = self.read_initial()?;
        if major != 4 {
            return Err(CodecError::invalid_structure(format!(
                "expected array, found major type {major}"
            )));
        }
        let len = self.read_argument(info)?;
        Self::check_length(len)?;
        Ok(len as usize)
    }

    /// Reads an unsigned integer.
    ///
    /// # Errors
    ///
    /// Returns an error if the next item is not an unsigned integer.
    pub fn decode_u64(&mut self) -> CodecResult<u64> {
        let (major, info) = self.read_initial()?;
        if major != 0 {
            return Err(CodecError::invalid_structure(format!(
                "expected unsigned integer, found major type {major}"
            )));
        }
        self.read_argument(info)
    }

    /// Reads a text string.
    ///
    /// # Errors
    ///
    /// Returns an error if the next item is not valid UTF-8 text.
    pub fn decode_text(&mut self) -> CodecResult<String> {
        let (major, info) = self.read_initial()?;
        if major != 3 {
            return Err(CodecError::invalid_structure(format!(
                "expected text, found major type {major}"
            )));
        }
        self.read_text_body(info)
    }

    /// Check if all bytes have been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get remaining bytes.
    #[must_use]
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    /// Fails if any input is left unread.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TrailingBytes`] when input remains.
    pub fn finish(&self) -> CodecResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CodecError::TrailingBytes {
                remaining: self.data.len() - self.pos,
            })
        }
    }

    fn read_initial(&mut self) -> CodecResult<(u8, u8)> {
        let byte = self.read_byte()?;
        Ok((byte >> 5, byte & 0x1f))
    }

    #[inline]
    fn read_byte(&mut self) -> CodecResult<u8> {
        let byte = *self.data.get(self.pos).ok_or(CodecError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    #[inline]
    fn read_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let end = self.pos.checked_add(N).ok_or(CodecError::UnexpectedEof)?;
        let slice = self
            .data
            .get(self.pos..end)
            .ok_or(CodecError::UnexpectedEof)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        self.pos = end;
        Ok(out)
    }

    fn read_argument(&mut self, info: u8) -> CodecResult<u64> {
        let (value, shorter_fits) = match info {
            0..=23 => return Ok(u64::from(info)),
            24 => {
                let v = u64::from(self.read_byte()?);
                (v, v < 24)
            }
            25 => {
                let v = u64::from(u16::from_be_bytes(self.read_array()?));
                (v, v <= u64::from(u8::MAX))
            }
            26 => {
                let v = u64::from(u32::from_be_bytes(self.read_array()?));
                (v, v <= u64::from(u16::MAX))
            }
            27 => {
                let v = u64::from_be_bytes(self.read_array()?);
                (v, v <= u64::from(u32::MAX))
            }
            31 => return Err(CodecError::IndefiniteLengthForbidden),
            _ => return Err(CodecError::invalid_structure("reserved additional info")),
        };
        if shorter_fits {
            return Err(CodecError::invalid_structure(
                "non-canonical: value could be encoded in fewer bytes",
            ));
        }
        Ok(value)
    }

    fn read_text_body(&mut self, info: u8) -> CodecResult<String> {
        let len = self.read_argument(info)?;
        Self::check_length(len)?;
        let len = len as usize;
        let end = self.pos.checked_add(len).ok_or(CodecError::UnexpectedEof)?;
        let bytes = self
            .data
            .get(self.pos..end)
            .ok_or(CodecError::UnexpectedEof)?;
        let text = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
        self.pos = end;
        Ok(text.to_string())
    }

    fn decode_simple(&mut self, info: u8) -> CodecResult<Value> {
        match info {
            20 => Ok(Value::Bool(false)),
            21 => Ok(Value::Bool(true)),
            22 | 23 => Err(CodecError::unsupported_type("null")),
            25 | 26 => Err(CodecError::invalid_structure(
                "non-canonical: floats are encoded as 64-bit",
            )),
            27 => {
                let x = f64::from_be_bytes(self.read_array()?);
                if x.is_nan() {
                    return Err(CodecError::NaNForbidden);
                }
                Ok(Value::Float(x))
            }
            31 => Err(CodecError::invalid_structure("break without indefinite")),
            _ => Err(CodecError::unsupported_type(format!("simple value {info}"))),
        }
    }

    fn check_length(len: u64) -> CodecResult<()> {
        if len > MAX_DECLARED_LENGTH {
            return Err(CodecError::SizeLimitExceeded {
                claimed: len,
                max_allowed: MAX_DECLARED_LENGTH,
            });
        }
        Ok(())
    }
}
