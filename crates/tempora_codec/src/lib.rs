//! # Tempora Codec
//!
//! The [`Value`] model and its canonical CBOR encoding.
//!
//! Every write Tempora stages carries a `Value`; durable write logs store
//! values (and the envelopes around them) as canonical CBOR so identical
//! writes always produce identical bytes.
//!
//! ## Canonical Rules
//!
//! - Integers and lengths use the shortest head
//! - Floats are always 64-bit and never NaN
//! - Links are tagged with [`LINK_TAG`]
//! - Strings must be UTF-8
//! - No indefinite-length items
//!
//! ## Usage
//!
//! ```
//! use tempora_codec::{to_canonical_cbor, from_cbor, Value};
//!
//! let value = Value::from("jeff");
//! let bytes = to_canonical_cbor(&value).unwrap();
//! assert_eq!(from_cbor(&bytes).unwrap(), value);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod value;

pub use decoder::{from_cbor, CanonicalDecoder};
pub use encoder::{to_canonical_cbor, CanonicalEncoder, LINK_TAG};
pub use error::{CodecError, CodecResult};
pub use value::Value;

/// Types that encode to canonical CBOR.
pub trait Encode {
    /// Encode this value to canonical CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the value holds a forbidden construct.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Types that decode from canonical CBOR.
pub trait Decode: Sized {
    /// Decode this value from CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are malformed or non-canonical.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

impl Encode for Value {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_canonical_cbor(self)
    }
}

impl Decode for Value {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Integer),
            any::<f64>()
                .prop_filter("NaN is not encodable", |x| !x.is_nan())
                .prop_map(Value::Float),
            ".{0,24}".prop_map(Value::Text),
            any::<u64>().prop_map(Value::Link),
        ]
    }

    #[test]
    fn standard_cbor_readers_accept_our_bytes() {
        let cases = [
            (Value::Integer(-100), ciborium::Value::Integer((-100).into())),
            (Value::Float(1.5), ciborium::Value::Float(1.5)),
            (Value::from("bar"), ciborium::Value::Text("bar".into())),
            (Value::Bool(true), ciborium::Value::Bool(true)),
            (
                Value::Link(7),
                ciborium::Value::Tag(LINK_TAG, Box::new(ciborium::Value::Integer(7.into()))),
            ),
        ];
        for (value, expected) in cases {
            let bytes = value.encode().unwrap();
            let parsed: ciborium::Value = ciborium::from_reader(bytes.as_slice()).unwrap();
            assert_eq!(parsed, expected, "{value:?}");
        }
    }

    #[test]
    fn ciborium_integers_are_already_canonical() {
        for n in [0i64, 23, 24, 255, 256, 65_535, 65_536, -1, -25, i64::MIN] {
            let mut theirs = Vec::new();
            ciborium::into_writer(&n, &mut theirs).unwrap();
            assert_eq!(Value::Integer(n).encode().unwrap(), theirs, "{n}");
        }
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(value in any_value()) {
            let bytes = value.encode().unwrap();
            let decoded = Value::decode(&bytes).unwrap();
            prop_assert_eq!(&decoded, &value);
            // canonical: re-encoding is byte-identical
            prop_assert_eq!(decoded.encode().unwrap(), bytes);
        }

        #[test]
        fn decoder_never_panics_on_garbage(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
            let _ = Value::decode(&bytes);
        }
    }
}
