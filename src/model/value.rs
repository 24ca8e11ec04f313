//! Typed attribute values and the depth key.
//!
//! A sample attribute either holds a [`Value`] or is undefined; undefined is
//! modeled as absence (`Option<Value>` = `None`) and is never an error.
//! Values carry a total order so filters and the sort stage can compare any
//! two of them deterministically, including across semantic types.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A typed attribute value.
///
/// The variants mirror the semantic types the [`AttributeRegistry`]
/// declares; conversion from raw strings and formatting for display are
/// centralized there, not here.
///
/// [`AttributeRegistry`]: crate::registry::AttributeRegistry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
}

impl Value {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Text view of the value, if it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Rank used to order values of different semantic types relative to
    /// each other: numerics, then text, then booleans.
    fn type_rank(&self) -> u8 {
        match self {
            Value::Integer(_) | Value::Float(_) => 0,
            Value::Text(_) => 1,
            Value::Boolean(_) => 2,
        }
    }

    /// Total order over values.
    ///
    /// Two numerics compare by numeric value (`f64::total_cmp` when floats
    /// are involved); mixed types compare by [`Self::type_rank`]. The
    /// undefined-sorts-last rule is the sort stage's job, not this one's.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Integer(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Float(a), Value::Integer(b)) => a.total_cmp(&(*b as f64)),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (a, b) => a.type_rank().cmp(&b.type_rank()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
            Value::Boolean(b) => write!(f, "{}", b),
        }
    }
}

/// Depth key of a sample within its core.
///
/// Wraps the numeric depth with a total order so it can key an ordered map;
/// two samples in one core never share a depth.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Depth(pub f64);

impl Depth {
    pub fn value(&self) -> f64 {
        self.0
    }
}

impl PartialEq for Depth {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for Depth {}

impl PartialOrd for Depth {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Depth {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl From<f64> for Depth {
    fn from(v: f64) -> Self {
        Depth(v)
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_comparison_across_variants() {
        assert_eq!(
            Value::Integer(2).total_cmp(&Value::Float(2.0)),
            Ordering::Equal
        );
        assert_eq!(
            Value::Float(1.5).total_cmp(&Value::Integer(2)),
            Ordering::Less
        );
    }

    #[test]
    fn test_mixed_type_ordering_is_stable() {
        let num = Value::Float(99.0);
        let text = Value::Text("a".to_string());
        let boolean = Value::Boolean(true);
        assert_eq!(num.total_cmp(&text), Ordering::Less);
        assert_eq!(text.total_cmp(&boolean), Ordering::Less);
        assert_eq!(boolean.total_cmp(&num), Ordering::Greater);
    }

    #[test]
    fn test_depth_orders_as_map_key() {
        let mut depths = vec![Depth(30.0), Depth(10.0), Depth(20.0)];
        depths.sort();
        assert_eq!(depths, vec![Depth(10.0), Depth(20.0), Depth(30.0)]);
    }

    #[test]
    fn test_display_formats() {
        assert_eq!(Value::Integer(7).to_string(), "7");
        assert_eq!(Value::Float(6.5).to_string(), "6.5");
        assert_eq!(Value::Text("lake".to_string()).to_string(), "lake");
        assert_eq!(Value::Boolean(false).to_string(), "false");
    }
}
