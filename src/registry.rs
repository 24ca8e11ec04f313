//! Attribute registry: declared attribute names, semantic types, and the
//! conversion/formatting rules everything else relies on.
//!
//! Every attribute referenced by a view, filter, workflow step, or import
//! column must exist here. Conversion failures are configuration errors
//! surfaced at import/selection time; formatting never fails for a value
//! that came out of this registry's own parser.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StratumError};
use crate::model::Value;

/// Attribute holding the unique record key of a sample.
pub const DEPTH_ATTRIBUTE: &str = "depth";

/// Attribute holding the imported record identifier, when the source has one.
pub const ID_ATTRIBUTE: &str = "id";

/// Pseudo-attribute answering the plan a virtual sample is viewed under.
pub const PLAN_ATTRIBUTE: &str = "computation plan";

/// Semantic type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    Integer,
    Float,
    Text,
    Boolean,
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeType::Integer => write!(f, "integer"),
            AttributeType::Float => write!(f, "float"),
            AttributeType::Text => write!(f, "text"),
            AttributeType::Boolean => write!(f, "boolean"),
        }
    }
}

/// Declaration of a single attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,
    pub kind: AttributeType,
    /// Engineering unit for display contexts that want it; not part of
    /// formatted values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl AttributeDef {
    pub fn new(name: impl Into<String>, kind: AttributeType) -> Self {
        Self {
            name: name.into(),
            kind,
            unit: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

/// Registry of all declared attributes, keyed by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributeRegistry {
    attributes: BTreeMap<String, AttributeDef>,
}

impl AttributeRegistry {
    /// Empty registry with no declarations at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-seeded with the attributes every repository carries:
    /// `depth`, `id`, and the `computation plan` pseudo-attribute.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(AttributeDef::new(DEPTH_ATTRIBUTE, AttributeType::Float));
        registry.register(AttributeDef::new(ID_ATTRIBUTE, AttributeType::Text));
        registry.register(AttributeDef::new(PLAN_ATTRIBUTE, AttributeType::Text));
        registry
    }

    /// Register a new attribute, replacing any existing declaration with
    /// the same name.
    pub fn register(&mut self, def: AttributeDef) {
        self.attributes.insert(def.name.clone(), def);
    }

    /// Remove a declaration. Built-ins can be removed too; doing so makes
    /// every view and filter that references them invalid at selection time.
    pub fn unregister(&mut self, name: &str) -> Option<AttributeDef> {
        self.attributes.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Iterate declarations in name order.
    pub fn iter(&self) -> impl Iterator<Item = &AttributeDef> {
        self.attributes.values()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Convert a raw imported string into a typed value.
    ///
    /// Empty (or all-whitespace) input converts to `None` — the attribute
    /// is undefined for that row, which is not an error. Anything else must
    /// parse according to the declared type.
    pub fn convert_value(&self, name: &str, raw: &str) -> Result<Option<Value>> {
        let def = self
            .get(name)
            .ok_or_else(|| StratumError::UnknownAttribute {
                attribute: name.to_string(),
                context: "import".to_string(),
            })?;

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let conversion_error = || StratumError::TypeConversion {
            attribute: name.to_string(),
            raw: raw.to_string(),
            expected: def.kind.to_string(),
        };

        let value = match def.kind {
            AttributeType::Integer => trimmed
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| conversion_error())?,
            AttributeType::Float => trimmed
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| conversion_error())?,
            AttributeType::Boolean => match trimmed {
                "true" | "True" => Value::Boolean(true),
                "false" | "False" => Value::Boolean(false),
                _ => return Err(conversion_error()),
            },
            AttributeType::Text => Value::Text(trimmed.to_string()),
        };

        Ok(Some(value))
    }

    /// Format a value for display or export. Undefined renders as the
    /// empty string; defined values use their canonical display form.
    pub fn format_value(&self, _name: &str, value: Option<&Value>) -> String {
        match value {
            Some(v) => v.to_string(),
            None => String::new(),
        }
    }

    /// Validate that every name in `names` is declared.
    ///
    /// Used when a view, filter, or sort key is selected; the `context`
    /// names the selecting entity for the error message.
    pub fn validate<'a, I>(&self, names: I, context: &str) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for name in names {
            if !self.contains(name) {
                return Err(StratumError::UnknownAttribute {
                    attribute: name.to_string(),
                    context: context.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn registry() -> AttributeRegistry {
        let mut r = AttributeRegistry::with_builtins();
        r.register(AttributeDef::new("temp", AttributeType::Float).with_unit("C"));
        r.register(AttributeDef::new("count", AttributeType::Integer));
        r.register(AttributeDef::new("flagged", AttributeType::Boolean));
        r.register(AttributeDef::new("source", AttributeType::Text));
        r
    }

    #[test]
    fn test_builtins_present() {
        let r = AttributeRegistry::with_builtins();
        assert!(r.contains(DEPTH_ATTRIBUTE));
        assert!(r.contains(ID_ATTRIBUTE));
        assert!(r.contains(PLAN_ATTRIBUTE));
    }

    #[test_case("temp", "5.5", Some(Value::Float(5.5)); "float parses")]
    #[test_case("count", "42", Some(Value::Integer(42)); "integer parses")]
    #[test_case("flagged", "true", Some(Value::Boolean(true)); "boolean parses")]
    #[test_case("source", "lake bed", Some(Value::Text("lake bed".to_string())); "text passes through")]
    #[test_case("temp", "", None; "empty is undefined")]
    #[test_case("temp", "   ", None; "whitespace is undefined")]
    fn test_convert_value(name: &str, raw: &str, expected: Option<Value>) {
        let r = registry();
        assert_eq!(r.convert_value(name, raw).unwrap(), expected);
    }

    #[test]
    fn test_convert_rejects_unparseable() {
        let r = registry();
        let err = r.convert_value("temp", "warm").unwrap_err();
        assert_eq!(err.error_code(), "TYPE_CONVERSION");
    }

    #[test]
    fn test_convert_rejects_unknown_attribute() {
        let r = registry();
        let err = r.convert_value("salinity", "35").unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_ATTRIBUTE");
    }

    #[test]
    fn test_format_round_trip_never_fails() {
        let r = registry();
        for (name, raw) in [("temp", "6.25"), ("count", "3"), ("flagged", "false")] {
            let value = r.convert_value(name, raw).unwrap();
            assert_eq!(r.format_value(name, value.as_ref()), raw);
        }
        assert_eq!(r.format_value("temp", None), "");
    }

    #[test]
    fn test_validate_reports_context() {
        let r = registry();
        assert!(r.validate(["temp", "depth"], "view 'All'").is_ok());
        let err = r
            .validate(["temp", "salinity"], "view 'All'")
            .unwrap_err();
        assert!(err.to_string().contains("salinity"));
        assert!(err.to_string().contains("view 'All'"));
    }
}
