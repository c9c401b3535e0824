//! Comparison operators for `explore`.

use crate::error::{CoreError, CoreResult};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use tempora_codec::Value;

/// How a stored value is compared against the operands of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `stored == values[0]`
    Equals,
    /// `stored != values[0]`
    NotEquals,
    /// `stored > values[0]`
    GreaterThan,
    /// `stored >= values[0]`
    GreaterThanOrEquals,
    /// `stored < values[0]`
    LessThan,
    /// `stored <= values[0]`
    LessThanOrEquals,
    /// `values[0] <= stored < values[1]`
    Between,
    /// The stored value's text fully matches the pattern `values[0]`.
    Regex,
    /// The stored value's text does not fully match `values[0]`.
    NotRegex,
}

impl Operator {
    /// All operators, in declaration order.
    pub const ALL: [Operator; 9] = [
        Operator::Equals,
        Operator::NotEquals,
        Operator::GreaterThan,
        Operator::GreaterThanOrEquals,
        Operator::LessThan,
        Operator::LessThanOrEquals,
        Operator::Between,
        Operator::Regex,
        Operator::NotRegex,
    ];

    /// How many operands the operator needs.
    #[must_use]
    pub const fn arity(self) -> usize {
        match self {
            Operator::Between => 2,
            _ => 1,
        }
    }

    /// Canonical upper-case name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Operator::Equals => "EQUALS",
            Operator::NotEquals => "NOT_EQUALS",
            Operator::GreaterThan => "GREATER_THAN",
            Operator::GreaterThanOrEquals => "GREATER_THAN_OR_EQUALS",
            Operator::LessThan => "LESS_THAN",
            Operator::LessThanOrEquals => "LESS_THAN_OR_EQUALS",
            Operator::Between => "BETWEEN",
            Operator::Regex => "REGEX",
            Operator::NotRegex => "NOT_REGEX",
        }
    }

    /// Short symbol accepted by [`FromStr`].
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Operator::Equals => "=",
            Operator::NotEquals => "!=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEquals => ">=",
            Operator::LessThan => "<",
            Operator::LessThanOrEquals => "<=",
            Operator::Between => "><",
            Operator::Regex => "regex",
            Operator::NotRegex => "nregex",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operator {
    type Err = CoreError;

    /// Parses a canonical name (any case) or a symbol.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Operator::ALL
            .into_iter()
            .find(|op| op.name().eq_ignore_ascii_case(trimmed) || op.symbol() == trimmed)
            .ok_or_else(|| CoreError::invalid_argument(format!("unknown operator `{s}`")))
    }
}

/// An operator with validated operands, ready to test many values.
///
/// Regex patterns are compiled once here, so an invalid pattern is
/// reported before any store is scanned.
#[derive(Debug, Clone)]
pub struct Criterion {
    operator: Operator,
    values: Vec<Value>,
    pattern: Option<Regex>,
}

impl Criterion {
    /// Validates `values` for `operator`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] when there are too few
    /// operands, BETWEEN is not given exactly two, or a regex operand does
    /// not compile.
    pub fn new(operator: Operator, values: Vec<Value>) -> CoreResult<Self> {
        let exact = operator == Operator::Between;
        if values.len() < operator.arity() || (exact && values.len() != operator.arity()) {
            return Err(CoreError::invalid_argument(format!(
                "{operator} needs {} value(s), got {}",
                operator.arity(),
                values.len()
            )));
        }
        let pattern = match operator {
            Operator::Regex | Operator::NotRegex => {
                let source = values[0].to_string();
                let anchored = format!("^(?:{source})$");
                Some(Regex::new(&anchored).map_err(|e| {
                    CoreError::invalid_argument(format!("invalid regex `{source}`: {e}"))
                })?)
            }
            _ => None,
        };
        Ok(Self {
            operator,
            values,
            pattern,
        })
    }

    /// The operator.
    #[must_use]
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// The operands.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Whether `stored` satisfies the criterion.
    #[must_use]
    pub fn matches(&self, stored: &Value) -> bool {
        let first = &self.values[0];
        match self.operator {
            Operator::Equals => stored == first,
            Operator::NotEquals => stored != first,
            Operator::GreaterThan => stored > first,
            Operator::GreaterThanOrEquals => stored >= first,
            Operator::LessThan => stored < first,
            Operator::LessThanOrEquals => stored <= first,
            Operator::Between => first <= stored && stored < &self.values[1],
            Operator::Regex => self.full_match(stored),
            Operator::NotRegex => !self.full_match(stored),
        }
    }

    fn full_match(&self, stored: &Value) -> bool {
        self.pattern
            .as_ref()
            .is_some_and(|re| re.is_match(&stored.to_string()))
    }
}

/// Tests one stored value against `operator` and `values`.
///
/// # Errors
///
/// Returns [`CoreError::InvalidArgument`] under the same conditions as
/// [`Criterion::new`].
pub fn matches(stored: &Value, operator: Operator, values: &[Value]) -> CoreResult<bool> {
    Ok(Criterion::new(operator, values.to_vec())?.matches(stored))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(n: i64) -> Value {
        Value::Integer(n)
    }

    #[test]
    fn comparisons() {
        assert!(matches(&v(5), Operator::Equals, &[v(5)]).unwrap());
        assert!(matches(&v(5), Operator::NotEquals, &[v(6)]).unwrap());
        assert!(matches(&v(5), Operator::GreaterThan, &[v(4)]).unwrap());
        assert!(!matches(&v(5), Operator::GreaterThan, &[v(5)]).unwrap());
        assert!(matches(&v(5), Operator::GreaterThanOrEquals, &[v(5)]).unwrap());
        assert!(matches(&v(5), Operator::LessThan, &[Value::Float(5.5)]).unwrap());
        assert!(matches(&v(5), Operator::LessThanOrEquals, &[v(5)]).unwrap());
    }

    #[test]
    fn between_is_half_open() {
        let bounds = [v(10), v(20)];
        assert!(matches(&v(10), Operator::Between, &bounds).unwrap());
        assert!(matches(&v(19), Operator::Between, &bounds).unwrap());
        assert!(!matches(&v(20), Operator::Between, &bounds).unwrap());
        assert!(!matches(&v(9), Operator::Between, &bounds).unwrap());
    }

    #[test]
    fn missing_operands_are_rejected() {
        assert!(matches!(
            Criterion::new(Operator::Between, vec![v(1)]),
            Err(CoreError::InvalidArgument { .. })
        ));
        assert!(Criterion::new(Operator::Equals, vec![]).is_err());
    }

    #[test]
    fn between_takes_exactly_two_bounds() {
        assert!(matches!(
            Criterion::new(Operator::Between, vec![v(1), v(5), v(9)]),
            Err(CoreError::InvalidArgument { .. })
        ));
        assert!(matches(&v(7), Operator::Between, &[v(1), v(5), v(9)]).is_err());
        assert!(Criterion::new(Operator::Between, vec![v(1), v(5)]).is_ok());
    }

    #[test]
    fn regex_is_a_full_match_on_display_text() {
        let jeff = Value::from("jeff");
        assert!(matches(&jeff, Operator::Regex, &[Value::from("j.*")]).unwrap());
        assert!(!matches(&jeff, Operator::Regex, &[Value::from("ef")]).unwrap());
        assert!(matches(&jeff, Operator::NotRegex, &[Value::from("ef")]).unwrap());
        assert!(matches(&Value::Link(12), Operator::Regex, &[Value::from(r"@\d+")]).unwrap());
        assert!(matches(&v(123), Operator::Regex, &[Value::from("1.3")]).unwrap());
    }

    #[test]
    fn invalid_regex_is_rejected_up_front() {
        let err = Criterion::new(Operator::Regex, vec![Value::from("(unclosed")]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument { .. }));
    }

    #[test]
    fn parse_names_and_symbols() {
        assert_eq!("EQUALS".parse::<Operator>().unwrap(), Operator::Equals);
        assert_eq!("between".parse::<Operator>().unwrap(), Operator::Between);
        assert_eq!(">=".parse::<Operator>().unwrap(), Operator::GreaterThanOrEquals);
        assert_eq!(" not_regex ".parse::<Operator>().unwrap(), Operator::NotRegex);
        assert!("LIKE".parse::<Operator>().is_err());
        for op in Operator::ALL {
            assert_eq!(op.to_string().parse::<Operator>().unwrap(), op);
        }
    }
}
