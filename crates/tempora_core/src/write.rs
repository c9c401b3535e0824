//! Writes: the immutable unit every store holds.

use crate::tokens::Token;
use crate::types::{RecordId, Version};
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tempora_codec::{
    CanonicalDecoder, CanonicalEncoder, CodecError, CodecResult, Decode, Encode, Value,
};

/// A key name. Clones share one allocation.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Arc<str>);

impl Key {
    /// Creates a key.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    /// Returns the key name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

/// Whether a write toggles a mapping on or off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Action {
    /// The mapping becomes present.
    Add = 1,
    /// The mapping becomes absent.
    Remove = 2,
}

impl Action {
    /// Converts a byte to an action.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Add),
            2 => Some(Self::Remove),
            _ => None,
        }
    }

    /// Converts the action to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "ADD",
            Self::Remove => "REMOVE",
        })
    }
}

/// An immutable, timestamped toggle of one `(key, value, record)` mapping.
///
/// Equality and hashing look only at `(key, value, record)`, so an ADD and
/// the REMOVE that cancels it compare equal.
#[derive(Debug, Clone)]
pub struct Write {
    action: Action,
    key: Key,
    value: Value,
    record: RecordId,
    version: Version,
}

impl Write {
    /// Creates a write.
    pub fn new(
        action: Action,
        key: impl Into<Key>,
        value: impl Into<Value>,
        record: RecordId,
        version: Version,
    ) -> Self {
        Self {
            action,
            key: key.into(),
            value: value.into(),
            record,
            version,
        }
    }

    /// Creates an ADD write.
    pub fn add(
        key: impl Into<Key>,
        value: impl Into<Value>,
        record: RecordId,
        version: Version,
    ) -> Self {
        Self::new(Action::Add, key, value, record, version)
    }

    /// Creates a REMOVE write.
    pub fn remove(
        key: impl Into<Key>,
        value: impl Into<Value>,
        record: RecordId,
        version: Version,
    ) -> Self {
        Self::new(Action::Remove, key, value, record, version)
    }

    /// The action.
    #[must_use]
    pub fn action(&self) -> Action {
        self.action
    }

    /// The key.
    #[must_use]
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// The value.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The record.
    #[must_use]
    pub fn record(&self) -> RecordId {
        self.record
    }

    /// The version.
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// The same toggle, stamped with a new version.
    #[must_use]
    pub fn restamped(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// The version tokens a change to this mapping invalidates: the cell,
    /// the record and the key.
    #[must_use]
    pub fn tokens(&self) -> [Token; 3] {
        [
            Token::cell(self.key.clone(), self.record),
            Token::record(self.record),
            Token::key(self.key.clone()),
        ]
    }
}

impl PartialEq for Write {
    fn eq(&self, other: &Self) -> bool {
        self.record == other.record && self.key == other.key && self.value == other.value
    }
}

impl Eq for Write {}

impl Hash for Write {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
        self.value.hash(state);
        self.record.hash(state);
    }
}

impl fmt::Display for Write {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} AS {} IN {}",
            self.action, self.key, self.value, self.record
        )
    }
}

/// Number of fields in the CBOR write envelope.
const ENVELOPE_FIELDS: usize = 5;

/// Canonical CBOR envelope: `[action, key, value, record, version]`.
impl Encode for Write {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        let mut encoder = CanonicalEncoder::with_capacity(32 + self.key.as_str().len());
        encoder.encode_array_header(ENVELOPE_FIELDS);
        encoder.encode_u64(u64::from(self.action.as_byte()));
        encoder.encode_text(self.key.as_str());
        encoder.encode(&self.value)?;
        encoder.encode_u64(self.record);
        encoder.encode_u64(self.version.as_u64());
        Ok(encoder.into_bytes())
    }
}

impl Decode for Write {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let mut decoder = CanonicalDecoder::new(bytes);
        let fields = decoder.decode_array_header()?;
        if fields != ENVELOPE_FIELDS {
            return Err(CodecError::invalid_structure(format!(
                "write envelope has {fields} fields, expected {ENVELOPE_FIELDS}"
            )));
        }
        let action = u8::try_from(decoder.decode_u64()?)
            .ok()
            .and_then(Action::from_byte)
            .ok_or_else(|| CodecError::invalid_structure("unknown write action"))?;
        let key = decoder.decode_text()?;
        let value = decoder.decode()?;
        let record = decoder.decode_u64()?;
        let version = Version::new(decoder.decode_u64()?);
        decoder.finish()?;
        Ok(Self::new(action, key, value, record, version))
    }
}
