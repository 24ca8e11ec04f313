//! Filters: named boolean predicates over samples.
//!
//! A filter is configuration, not data: it can be swapped at any time
//! without touching stored samples. Rules compare one attribute against an
//! operand; a filter combines its rules with all-of or any-of semantics.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::core::VirtualSample;
use crate::model::value::Value;
use crate::registry::AttributeRegistry;

/// Comparison operator of a single filter rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
    Defined,
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "!=",
            FilterOp::Lt => "<",
            FilterOp::Le => "<=",
            FilterOp::Gt => ">",
            FilterOp::Ge => ">=",
            FilterOp::Contains => "contains",
            FilterOp::Defined => "is defined",
        };
        write!(f, "{}", symbol)
    }
}

/// One comparison: `attribute op operand`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRule {
    pub attribute: String,
    pub op: FilterOp,
    /// Not used (and not required) by `Defined`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operand: Option<Value>,
}

impl FilterRule {
    pub fn new(attribute: impl Into<String>, op: FilterOp, operand: Option<Value>) -> Self {
        Self {
            attribute: attribute.into(),
            op,
            operand,
        }
    }

    fn matches(&self, sample: &VirtualSample<'_>) -> bool {
        let value = sample.get(&self.attribute);

        if self.op == FilterOp::Defined {
            return value.is_some();
        }

        // Ordered and containment comparisons need both sides present.
        let (value, operand) = match (value, self.operand.as_ref()) {
            (Some(v), Some(o)) => (v, o),
            _ => return false,
        };

        match self.op {
            FilterOp::Contains => match (&value, operand) {
                (Value::Text(haystack), Value::Text(needle)) => haystack.contains(needle.as_str()),
                _ => value.to_string().contains(&operand.to_string()),
            },
            FilterOp::Eq => value.total_cmp(operand) == Ordering::Equal,
            FilterOp::Ne => value.total_cmp(operand) != Ordering::Equal,
            FilterOp::Lt => value.total_cmp(operand) == Ordering::Less,
            FilterOp::Le => value.total_cmp(operand) != Ordering::Greater,
            FilterOp::Gt => value.total_cmp(operand) == Ordering::Greater,
            FilterOp::Ge => value.total_cmp(operand) != Ordering::Less,
            FilterOp::Defined => unreachable!("handled above"),
        }
    }

    fn describe(&self) -> String {
        match (&self.op, &self.operand) {
            (FilterOp::Defined, _) => format!("{} {}", self.attribute, self.op),
            (_, Some(operand)) => format!("{} {} {}", self.attribute, self.op, operand),
            (_, None) => format!("{} {} <missing operand>", self.attribute, self.op),
        }
    }
}

/// How a filter combines its rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterCombine {
    All,
    Any,
}

/// Named predicate with a human-readable description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub name: String,
    /// Explicit description; when absent one is generated from the rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub combine: FilterCombine,
    pub rules: Vec<FilterRule>,
}

impl Filter {
    pub fn new(name: impl Into<String>, combine: FilterCombine, rules: Vec<FilterRule>) -> Self {
        Self {
            name: name.into(),
            description: None,
            combine,
            rules,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Apply the predicate to one virtual sample.
    pub fn matches(&self, sample: &VirtualSample<'_>) -> bool {
        match self.combine {
            FilterCombine::All => self.rules.iter().all(|r| r.matches(sample)),
            FilterCombine::Any => self.rules.iter().any(|r| r.matches(sample)),
        }
    }

    /// Human-readable description of what the filter selects.
    pub fn describe(&self) -> String {
        if let Some(desc) = &self.description {
            return desc.clone();
        }
        if self.rules.is_empty() {
            return "matches everything".to_string();
        }
        let joiner = match self.combine {
            FilterCombine::All => " and ",
            FilterCombine::Any => " or ",
        };
        self.rules
            .iter()
            .map(FilterRule::describe)
            .collect::<Vec<_>>()
            .join(joiner)
    }

    /// Selection-time validation against the registry.
    pub fn validate(&self, registry: &AttributeRegistry) -> Result<()> {
        registry.validate(
            self.rules.iter().map(|r| r.attribute.as_str()),
            &format!("filter '{}'", self.name),
        )
    }
}
