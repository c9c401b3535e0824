//! The typed payload stored in every write.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A typed, totally ordered value.
///
/// Numeric kinds ([`Value::Integer`], [`Value::Float`], [`Value::Link`])
/// compare by magnitude and sort before [`Value::Bool`], which sorts before
/// [`Value::Text`]. Text compares case-insensitively first and falls back to
/// a case-sensitive comparison, so `"Jeff" < "jeff"` but both sort before
/// `"Jefferson"`. Numerically equal values of different kinds are ordered
/// by kind, which keeps `Eq` exact: `Integer(1) != Float(1.0)`.
#[derive(Debug, Clone)]
pub enum Value {
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Double-precision float. NaN is representable but refused by the
    /// encoder.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// Reference to another record.
    Link(u64),
}

impl Value {
    /// Returns the integer, if this is an integer value.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Value::Integer(_) => 0,
            Value::Float(_) => 1,
            Value::Link(_) => 2,
            Value::Bool(_) => 3,
            Value::Text(_) => 4,
        }
    }

    fn number(&self) -> Option<Number> {
        match self {
            Value::Integer(n) => Some(Number::Exact(i128::from(*n))),
            Value::Link(r) => Some(Number::Exact(i128::from(*r))),
            Value::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }
}

#[derive(Clone, Copy)]
enum Number {
    Exact(i128),
    Float(f64),
}

impl Number {
    fn cmp(self, other: Number) -> Ordering {
        match (self, other) {
            (Number::Exact(a), Number::Exact(b)) => a.cmp(&b),
            (Number::Float(a), Number::Float(b)) => a.total_cmp(&b),
            (Number::Exact(a), Number::Float(b)) => cmp_exact_float(a, b),
            (Number::Float(a), Number::Exact(b)) => cmp_exact_float(b, a).reverse(),
        }
    }
}

/// Exact comparison of an integer against a float, without rounding the
/// integer through `f64`. NaN sorts after every integer.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn cmp_exact_float(a: i128, b: f64) -> Ordering {
    if b.is_nan() {
        return Ordering::Less;
    }
    // Every i64/u64 lies well inside +-2^100.
    const BOUND: f64 = 1.267_650_600_228_229_4e30;
    if b >= BOUND {
        return Ordering::Less;
    }
    if b <= -BOUND {
        return Ordering::Greater;
    }
    let whole = b.trunc();
    match a.cmp(&(whole as i128)) {
        Ordering::Equal => {
            let frac = b - whole;
            if frac > 0.0 {
                Ordering::Less
            } else if frac < 0.0 {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        }
        ord => ord,
    }
}

fn cmp_text(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
        .then_with(|| a.cmp(b))
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.number(), other.number()) {
            (Some(a), Some(b)) => a
                .cmp(b)
                .then_with(|| self.kind_rank().cmp(&other.kind_rank())),
            _ => match (self, other) {
                (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
                (Value::Text(a), Value::Text(b)) => cmp_text(a, b),
                _ => self.kind_rank().cmp(&other.kind_rank()),
            },
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind_rank().hash(state);
        match self {
            Value::Bool(b) => b.hash(state),
            Value::Integer(n) => n.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Text(s) => s.hash(state),
            Value::Link(r) => r.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
            Value::Link(r) => write!(f, "@{r}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}
