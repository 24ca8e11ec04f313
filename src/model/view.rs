//! Views: ordered attribute lists controlling display, export, and sort
//! columns.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::registry::{AttributeRegistry, ID_ATTRIBUTE, PLAN_ATTRIBUTE};

/// Named, ordered list of attribute identifiers.
///
/// Iteration always yields `id`, then `computation plan`, then the
/// configured attributes in configured order — the two-element prefix is
/// fixed no matter how the view was configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub name: String,
    attributes: Vec<String>,
}

impl View {
    pub fn new(name: impl Into<String>, attributes: Vec<String>) -> Self {
        Self {
            name: name.into(),
            attributes,
        }
    }

    /// The "All" view: every attribute the registry declares.
    pub fn all(registry: &AttributeRegistry) -> Self {
        Self::new(
            "All",
            registry.iter().map(|def| def.name.clone()).collect(),
        )
    }

    /// Attribute identifiers in display order, fixed prefix first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        [ID_ATTRIBUTE, PLAN_ATTRIBUTE].into_iter().chain(
            self.attributes
                .iter()
                .map(String::as_str)
                .filter(|a| *a != ID_ATTRIBUTE && *a != PLAN_ATTRIBUTE),
        )
    }

    pub fn contains(&self, attr: &str) -> bool {
        self.iter().any(|a| a == attr)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        false // the fixed prefix is always present
    }

    /// The configured tail as stored, without the fixed prefix applied.
    pub fn configured(&self) -> &[String] {
        &self.attributes
    }

    /// Selection-time validation against the registry.
    pub fn validate(&self, registry: &AttributeRegistry) -> Result<()> {
        registry.validate(self.iter(), &format!("view '{}'", self.name))
    }
}
