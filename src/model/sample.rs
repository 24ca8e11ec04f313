//! Layered sample records.
//!
//! A sample holds one attribute map per layer: the immutable `input` layer
//! from import, plus one layer per computation plan applied to it. Lookups
//! resolve through the layers in priority order, newest plan first, ending
//! at `input`; an attribute no layer defines is undefined, never an error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StratumError};
use crate::model::value::{Depth, Value};
use crate::registry::DEPTH_ATTRIBUTE;

/// Name of the immutable imported layer.
pub const INPUT_LAYER: &str = "input";

/// One depth's record, composed of layered attribute sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    /// Layer name → attribute name → value.
    layers: BTreeMap<String, BTreeMap<String, Value>>,
    /// Plan layer names in application order, oldest first. The resolution
    /// priority is derived from this list, never from map iteration order.
    applied: Vec<String>,
    /// Bumped on every mutation so observers can detect staleness.
    #[serde(skip)]
    revision: u64,
}

impl Sample {
    /// Create a sample from its imported input values.
    pub fn new(input: BTreeMap<String, Value>) -> Self {
        let mut layers = BTreeMap::new();
        layers.insert(INPUT_LAYER.to_string(), input);
        Self {
            layers,
            applied: Vec::new(),
            revision: 0,
        }
    }

    /// The sample's depth, read from the input layer.
    pub fn depth(&self) -> Option<Depth> {
        self.get_in_layer(INPUT_LAYER, DEPTH_ATTRIBUTE)
            .and_then(Value::as_f64)
            .map(Depth)
    }

    /// Resolve an attribute across layers: newest plan layer first, then
    /// earlier plan layers in reverse application order, `input` last.
    /// Unknown attributes resolve to `None`.
    pub fn get(&self, attr: &str) -> Option<&Value> {
        for layer in self.resolution_order() {
            if let Some(value) = self.layers.get(layer).and_then(|l| l.get(attr)) {
                return Some(value);
            }
        }
        None
    }

    /// Read an attribute from one specific layer only.
    pub fn get_in_layer(&self, layer: &str, attr: &str) -> Option<&Value> {
        self.layers.get(layer).and_then(|l| l.get(attr))
    }

    /// Write an attribute into the named layer, creating the layer on first
    /// write. A new non-input layer is appended to the application order.
    pub fn set_in_layer(&mut self, layer: &str, attr: impl Into<String>, value: Value) {
        if layer != INPUT_LAYER && !self.applied.iter().any(|l| l == layer) {
            self.applied.push(layer.to_string());
        }
        self.layers
            .entry(layer.to_string())
            .or_default()
            .insert(attr.into(), value);
        self.revision += 1;
    }

    /// Layer names currently present: `input` plus plan layers in
    /// application order.
    pub fn layers(&self) -> impl Iterator<Item = &str> {
        std::iter::once(INPUT_LAYER).chain(self.applied.iter().map(String::as_str))
    }

    /// Plan layers in application order, oldest first.
    pub fn plan_layers(&self) -> &[String] {
        &self.applied
    }

    pub fn has_layer(&self, layer: &str) -> bool {
        layer == INPUT_LAYER || self.applied.iter().any(|l| l == layer)
    }

    /// Remove a layer. `input` is rejected; removing any other layer
    /// succeeds whether or not it is present.
    pub fn remove_layer(&mut self, layer: &str) -> Result<()> {
        if layer == INPUT_LAYER {
            return Err(StratumError::ProtectedLayer);
        }
        if self.layers.remove(layer).is_some() {
            self.applied.retain(|l| l != layer);
            self.revision += 1;
        }
        Ok(())
    }

    /// Remove every plan layer, leaving only `input`.
    pub fn strip_plan_layers(&mut self) {
        if self.applied.is_empty() {
            return;
        }
        for layer in self.applied.drain(..) {
            self.layers.remove(&layer);
        }
        self.revision += 1;
    }

    /// Overlay another sample's layers onto this one (insert-or-merge on
    /// re-import: incoming values win per attribute, missing ones are kept).
    pub fn merge(&mut self, other: Sample) {
        let Sample {
            layers, applied, ..
        } = other;
        for (layer, attrs) in layers {
            for (attr, value) in attrs {
                self.set_in_layer(&layer, attr, value);
            }
        }
        // set_in_layer appended any new plan layers; keep the incoming
        // application order for layers this sample had not seen.
        debug_assert!(applied.iter().all(|l| self.applied.contains(l)));
    }

    /// Monotonic mutation counter for the change-notification contract.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Attribute names defined by one layer, for export and inspection.
    pub fn layer_attributes(&self, layer: &str) -> impl Iterator<Item = &str> {
        self.layers
            .get(layer)
            .into_iter()
            .flat_map(|l| l.keys().map(String::as_str))
    }

    fn resolution_order(&self) -> impl Iterator<Item = &str> {
        self.applied
            .iter()
            .rev()
            .map(String::as_str)
            .chain(std::iter::once(INPUT_LAYER))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_with_input(pairs: &[(&str, Value)]) -> Sample {
        let input = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        Sample::new(input)
    }

    #[test]
    fn test_undefined_attribute_is_none_not_error() {
        let sample = sample_with_input(&[("depth", Value::Float(10.0))]);
        assert_eq!(sample.get("no such attribute"), None);
    }

    #[test]
    fn test_resolution_prefers_newest_plan_layer() {
        let mut sample = sample_with_input(&[("temp", Value::Float(5.0))]);
        sample.set_in_layer("calib", "temp", Value::Float(6.0));
        sample.set_in_layer("recalib", "temp", Value::Float(7.0));

        assert_eq!(sample.get("temp"), Some(&Value::Float(7.0)));

        sample.remove_layer("recalib").unwrap();
        assert_eq!(sample.get("temp"), Some(&Value::Float(6.0)));

        sample.remove_layer("calib").unwrap();
        assert_eq!(sample.get("temp"), Some(&Value::Float(5.0)));
    }

    #[test]
    fn test_resolution_falls_back_to_input() {
        let mut sample = sample_with_input(&[("temp", Value::Float(5.0))]);
        sample.set_in_layer("calib", "temp_calibrated", Value::Float(6.0));

        // calib does not define temp, so resolution falls through to input.
        assert_eq!(sample.get("temp"), Some(&Value::Float(5.0)));
        assert_eq!(sample.get("temp_calibrated"), Some(&Value::Float(6.0)));
    }

    #[test]
    fn test_input_layer_cannot_be_removed() {
        let mut sample = sample_with_input(&[("depth", Value::Float(1.0))]);
        let err = sample.remove_layer(INPUT_LAYER).unwrap_err();
        assert_eq!(err.error_code(), "PROTECTED_LAYER");
        assert!(sample.has_layer(INPUT_LAYER));
    }

    #[test]
    fn test_remove_layer_is_idempotent() {
        let mut sample = sample_with_input(&[("depth", Value::Float(1.0))]);
        sample.set_in_layer("calib", "x", Value::Integer(1));

        sample.remove_layer("calib").unwrap();
        assert!(!sample.has_layer("calib"));

        // Absent layer: still succeeds.
        sample.remove_layer("calib").unwrap();
        assert!(!sample.has_layer("calib"));
    }

    #[test]
    fn test_strip_plan_layers_keeps_input() {
        let mut sample = sample_with_input(&[("temp", Value::Float(5.0))]);
        sample.set_in_layer("a", "x", Value::Integer(1));
        sample.set_in_layer("b", "y", Value::Integer(2));

        sample.strip_plan_layers();

        assert_eq!(sample.layers().collect::<Vec<_>>(), vec![INPUT_LAYER]);
        assert_eq!(sample.get("temp"), Some(&Value::Float(5.0)));
        assert_eq!(sample.get("x"), None);
    }

    #[test]
    fn test_depth_reads_input_layer() {
        let mut sample = sample_with_input(&[("depth", Value::Float(12.5))]);
        // A plan layer shadowing depth must not change the record key.
        sample.set_in_layer("calib", "depth", Value::Float(99.0));
        assert_eq!(sample.depth(), Some(Depth(12.5)));
    }

    #[test]
    fn test_merge_overlays_values() {
        let mut sample = sample_with_input(&[
            ("depth", Value::Float(10.0)),
            ("temp", Value::Float(5.0)),
        ]);
        let incoming = sample_with_input(&[
            ("depth", Value::Float(10.0)),
            ("temp", Value::Float(5.5)),
            ("source", Value::Text("2nd run".to_string())),
        ]);

        sample.merge(incoming);

        assert_eq!(sample.get("temp"), Some(&Value::Float(5.5)));
        assert_eq!(
            sample.get("source"),
            Some(&Value::Text("2nd run".to_string()))
        );
    }

    #[test]
    fn test_revision_bumps_on_mutation() {
        let mut sample = sample_with_input(&[("depth", Value::Float(1.0))]);
        let r0 = sample.revision();
        sample.set_in_layer("calib", "x", Value::Integer(1));
        assert!(sample.revision() > r0);

        let r1 = sample.revision();
        sample.remove_layer("calib").unwrap();
        assert!(sample.revision() > r1);

        // No-op removal does not bump.
        let r2 = sample.revision();
        sample.remove_layer("calib").unwrap();
        assert_eq!(sample.revision(), r2);
    }
}
