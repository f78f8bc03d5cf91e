//! Runtime values.

use carri_syntax::{Literal, ValueKind};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A runtime value.
///
/// Collections are ordered so iteration, printing and grounding order are
/// deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    Int(i64),
    Bool(bool),
    /// `MULTY`
    Set(BTreeSet<i64>),
    /// `MATCH`
    Map(BTreeMap<i64, i64>),
    /// Literal list with non-integer elements; indexed by position.
    Seq(Vec<Value>),
}

impl Value {
    #[inline]
    pub fn int(n: i64) -> Self {
        Value::Int(n)
    }

    #[inline]
    pub fn bool(b: bool) -> Self {
        Value::Bool(b)
    }

    pub fn set(elements: impl IntoIterator<Item = i64>) -> Self {
        Value::Set(elements.into_iter().collect())
    }

    pub fn map(pairs: impl IntoIterator<Item = (i64, i64)>) -> Self {
        Value::Map(pairs.into_iter().collect())
    }

    /// Initial value of a variable of this kind.
    pub fn default_for(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Int => Value::Int(0),
            ValueKind::Bool => Value::Bool(false),
            ValueKind::Multy => Value::Set(BTreeSet::new()),
            ValueKind::Match => Value::Map(BTreeMap::new()),
        }
    }

    /// Convert a problem literal to a value of `kind`.
    pub fn from_literal(literal: &Literal, kind: ValueKind) -> Option<Self> {
        match (literal, kind) {
            (Literal::Int(n), ValueKind::Int) => Some(Value::Int(*n)),
            (Literal::Bool(b), ValueKind::Bool) => Some(Value::Bool(*b)),
            (Literal::Set(elements), ValueKind::Multy) => {
                Some(Value::set(elements.iter().copied()))
            }
            (Literal::Map(pairs), ValueKind::Match) => Some(Value::map(pairs.iter().copied())),
            _ => None,
        }
    }

    /// True if this value can be stored in a variable of `kind`.
    pub fn matches(&self, kind: ValueKind) -> bool {
        matches!(
            (self, kind),
            (Value::Int(_), ValueKind::Int)
                | (Value::Bool(_), ValueKind::Bool)
                | (Value::Set(_), ValueKind::Multy)
                | (Value::Map(_), ValueKind::Match)
        )
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "Int",
            Value::Bool(_) => "Bool",
            Value::Set(_) => "Set",
            Value::Map(_) => "Map",
            Value::Seq(_) => "Seq",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Set(s) => {
                write!(f, "{{")?;
                for (i, n) in s.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", n)?;
                }
                write!(f, "}}")
            }
            Value::Map(m) => {
                write!(f, "[")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}:{}", k, v)?;
                }
                write!(f, "]")
            }
            Value::Seq(elements) => {
                write!(f, "(")?;
                for (i, v) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_their_kind() {
        for kind in [
            ValueKind::Int,
            ValueKind::Bool,
            ValueKind::Multy,
            ValueKind::Match,
        ] {
            assert!(Value::default_for(kind).matches(kind));
        }
    }

    #[test]
    fn test_from_literal_checks_kind() {
        assert_eq!(
            Value::from_literal(&Literal::Set(vec![3, 1]), ValueKind::Multy),
            Some(Value::set([1, 3]))
        );
        assert_eq!(Value::from_literal(&Literal::Int(1), ValueKind::Bool), None);
    }

    #[test]
    fn test_display_uses_problem_syntax() {
        assert_eq!(Value::set([2, 0]).to_string(), "{0 2}");
        assert_eq!(Value::map([(1, 4), (2, 5)]).to_string(), "[1:4 2:5]");
        assert_eq!(
            Value::Seq(vec![Value::Bool(true), Value::set([1])]).to_string(),
            "(true, {1})"
        );
    }
}
