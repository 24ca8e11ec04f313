//! Core: a named, ordered collection of depth-indexed samples.
//!
//! The core owns the real sample data. Workflows never write to it
//! directly; they operate on an isolated [`WorkingCore`] produced by
//! [`Core::new_computation`], whose results reach the core only through
//! [`Core::commit_computation`]. Failed or aborted runs roll back through
//! [`Core::strip_experiment`], which is also the user-facing strip action.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StratumError};
use crate::model::sample::{Sample, INPUT_LAYER};
use crate::model::value::{Depth, Value};
use crate::registry::PLAN_ATTRIBUTE;

/// Change notification delivered to subscribed observers.
///
/// This is a narrow observer contract for display layers that need to know
/// when to refresh, not a general event bus.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    SampleAdded { depth: Depth },
    SampleRemoved { depth: Depth },
    LayerCommitted { plan: String },
    LayerStripped { plan: String },
}

type ChangeHook = Box<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Provenance of the most recent import into a core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportProvenance {
    /// Optional source label stamped onto imported rows.
    pub source: Option<String>,
    /// SHA-256 fingerprint of the imported bytes.
    pub fingerprint: String,
    pub imported_at: DateTime<Utc>,
}

/// Named collection of depth-indexed samples (one imported dataset).
///
/// Serializes through [`CoreDoc`]: samples persist as a list and the
/// depth-keyed map is rebuilt on load from each sample's own depth.
pub struct Core {
    name: String,
    samples: BTreeMap<Depth, Sample>,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
    provenance: Option<ImportProvenance>,
    hooks: Vec<ChangeHook>,
}

/// Persisted form of a core.
#[derive(Serialize, Deserialize)]
struct CoreDoc {
    name: String,
    samples: Vec<Sample>,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    provenance: Option<ImportProvenance>,
}

impl Serialize for Core {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct CoreDocRef<'a> {
            name: &'a str,
            samples: Vec<&'a Sample>,
            created_at: &'a DateTime<Utc>,
            modified_at: &'a DateTime<Utc>,
            #[serde(skip_serializing_if = "Option::is_none")]
            provenance: &'a Option<ImportProvenance>,
        }

        CoreDocRef {
            name: &self.name,
            samples: self.samples.values().collect(),
            created_at: &self.created_at,
            modified_at: &self.modified_at,
            provenance: &self.provenance,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Core {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let doc = CoreDoc::deserialize(deserializer)?;
        let mut samples = BTreeMap::new();
        for sample in doc.samples {
            let depth = sample.depth().ok_or_else(|| {
                serde::de::Error::custom(format!(
                    "core '{}' holds a sample without a depth",
                    doc.name
                ))
            })?;
            samples.insert(depth, sample);
        }
        Ok(Self {
            name: doc.name,
            samples,
            created_at: doc.created_at,
            modified_at: doc.modified_at,
            provenance: doc.provenance,
            hooks: Vec::new(),
        })
    }
}

impl fmt::Debug for Core {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Core")
            .field("name", &self.name)
            .field("samples", &self.samples.len())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl Core {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            samples: BTreeMap::new(),
            created_at: now,
            modified_at: now,
            provenance: None,
            hooks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }

    pub fn provenance(&self) -> Option<&ImportProvenance> {
        self.provenance.as_ref()
    }

    pub fn set_provenance(&mut self, provenance: ImportProvenance) {
        self.provenance = Some(provenance);
        self.touch();
    }

    /// Depths in ascending order.
    pub fn depths(&self) -> impl Iterator<Item = Depth> + '_ {
        self.samples.keys().copied()
    }

    pub fn get(&self, depth: Depth) -> Option<&Sample> {
        self.samples.get(&depth)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Depth, &Sample)> {
        self.samples.iter().map(|(d, s)| (*d, s))
    }

    /// Subscribe a change hook. Hooks are not persisted and survive only as
    /// long as this in-memory core.
    pub fn subscribe(&mut self, hook: impl Fn(&ChangeEvent) + Send + Sync + 'static) {
        self.hooks.push(Box::new(hook));
    }

    fn notify(&self, event: ChangeEvent) {
        for hook in &self.hooks {
            hook(&event);
        }
    }

    fn touch(&mut self) {
        self.modified_at = Utc::now();
    }

    /// Insert a sample, or merge it into the existing sample at the same
    /// depth. Returns the depth the sample landed on.
    pub fn add(&mut self, sample: Sample) -> Result<Depth> {
        let depth = sample.depth().ok_or(StratumError::SampleWithoutDepth)?;
        match self.samples.get_mut(&depth) {
            Some(existing) => existing.merge(sample),
            None => {
                self.samples.insert(depth, sample);
            }
        }
        self.touch();
        self.notify(ChangeEvent::SampleAdded { depth });
        Ok(depth)
    }

    /// Delete the sample at `depth` entirely.
    pub fn remove(&mut self, depth: Depth) -> Result<Sample> {
        let sample = self
            .samples
            .remove(&depth)
            .ok_or_else(|| StratumError::SampleNotFound {
                core: self.name.clone(),
                depth: depth.value(),
            })?;
        self.touch();
        self.notify(ChangeEvent::SampleRemoved { depth });
        Ok(sample)
    }

    /// Names of every plan layer present on at least one sample, sorted.
    pub fn plan_names(&self) -> BTreeSet<String> {
        self.samples
            .values()
            .flat_map(|s| s.plan_layers().iter().cloned())
            .collect()
    }

    /// Produce the per-plan read-only sample groups for display: the
    /// always-present input-only group, then one group per distinct plan
    /// layer in name order. Groups borrow the samples; nothing is cloned.
    pub fn virtualize(&self) -> Vec<SampleGroup<'_>> {
        let mut groups = vec![SampleGroup {
            plan: None,
            samples: self
                .samples
                .values()
                .map(|sample| VirtualSample { plan: None, sample })
                .collect(),
        }];

        for plan in self.plan_names() {
            let mut samples = Vec::new();
            for sample in self.samples.values() {
                if let Some(layer) = sample.plan_layers().iter().find(|l| **l == plan) {
                    samples.push(VirtualSample {
                        plan: Some(layer.as_str()),
                        sample,
                    });
                }
            }
            groups.push(SampleGroup {
                plan: Some(plan),
                samples,
            });
        }

        groups
    }

    /// Produce an isolated working copy for a computation plan.
    ///
    /// The working copy owns a snapshot of every sample plus an empty layer
    /// under construction; writes to it are invisible here until
    /// [`Core::commit_computation`].
    pub fn new_computation(&self, plan: impl Into<String>) -> WorkingCore {
        let plan = plan.into();
        WorkingCore {
            core_name: self.name.clone(),
            samples: self
                .samples
                .iter()
                .map(|(depth, sample)| {
                    (
                        *depth,
                        WorkingSample {
                            base: sample.clone(),
                            new_layer: BTreeMap::new(),
                        },
                    )
                })
                .collect(),
            plan,
        }
    }

    /// Merge a finished working copy's new layer into the real samples.
    ///
    /// All-or-nothing: every affected depth is validated first, and a
    /// validation failure applies nothing. A failure here is resolved by
    /// the caller through [`Core::strip_experiment`].
    pub fn commit_computation(&mut self, working: WorkingCore) -> Result<()> {
        for depth in working
            .samples
            .iter()
            .filter(|(_, ws)| !ws.new_layer.is_empty())
            .map(|(d, _)| *d)
        {
            if !self.samples.contains_key(&depth) {
                return Err(StratumError::SampleNotFound {
                    core: self.name.clone(),
                    depth: depth.value(),
                });
            }
        }

        let plan = working.plan.clone();
        let mut affected = 0usize;
        for (depth, ws) in working.samples {
            if ws.new_layer.is_empty() {
                continue;
            }
            let sample = self
                .samples
                .get_mut(&depth)
                .expect("validated depth present");
            for (attr, value) in ws.new_layer {
                sample.set_in_layer(&plan, attr, value);
            }
            affected += 1;
        }

        tracing::debug!(core = %self.name, plan = %plan, affected, "committed computation layer");
        self.touch();
        self.notify(ChangeEvent::LayerCommitted { plan });
        Ok(())
    }

    /// Remove the named plan layer from every sample that has it.
    ///
    /// Idempotent: absent layers are a successful no-op. This single code
    /// path serves both the user-facing strip action and executor rollback.
    /// Returns the number of samples the layer was removed from.
    pub fn strip_experiment(&mut self, plan: &str) -> usize {
        assert!(
            plan != INPUT_LAYER,
            "the input layer is not an experiment and cannot be stripped"
        );

        let mut stripped = 0usize;
        for sample in self.samples.values_mut() {
            if sample.has_layer(plan) {
                sample
                    .remove_layer(plan)
                    .expect("non-input layer removal cannot fail");
                stripped += 1;
            }
        }

        if stripped > 0 {
            tracing::debug!(core = %self.name, plan, stripped, "stripped plan layer");
            self.touch();
            self.notify(ChangeEvent::LayerStripped {
                plan: plan.to_string(),
            });
        }
        stripped
    }
}

/// One display group produced by [`Core::virtualize`]: the samples as seen
/// under a single plan context (`None` = the input-only group).
#[derive(Debug)]
pub struct SampleGroup<'a> {
    pub plan: Option<String>,
    pub samples: Vec<VirtualSample<'a>>,
}

/// A read-only view of one sample under a plan context.
///
/// Resolution consults the plan layer (when the context has one), then the
/// input layer; the `computation plan` pseudo-attribute answers the context
/// name itself.
#[derive(Debug, Clone, Copy)]
pub struct VirtualSample<'a> {
    plan: Option<&'a str>,
    sample: &'a Sample,
}

impl<'a> VirtualSample<'a> {
    pub fn plan(&self) -> &str {
        self.plan.unwrap_or(INPUT_LAYER)
    }

    pub fn depth(&self) -> Option<Depth> {
        self.sample.depth()
    }

    pub fn sample(&self) -> &'a Sample {
        self.sample
    }

    /// Resolve an attribute in this view's context.
    pub fn get(&self, attr: &str) -> Option<Value> {
        if attr == PLAN_ATTRIBUTE {
            return Some(Value::Text(self.plan().to_string()));
        }
        if let Some(plan) = self.plan {
            if let Some(value) = self.sample.get_in_layer(plan, attr) {
                return Some(value.clone());
            }
        }
        self.sample.get_in_layer(INPUT_LAYER, attr).cloned()
    }
}

/// Isolated, writable projection of a core used while a workflow runs.
///
/// Shares sample identity with the core through the depth key; owns its
/// data so a worker thread can mutate it freely.
#[derive(Debug)]
pub struct WorkingCore {
    core_name: String,
    plan: String,
    samples: BTreeMap<Depth, WorkingSample>,
}

impl WorkingCore {
    pub fn core_name(&self) -> &str {
        &self.core_name
    }

    pub fn plan(&self) -> &str {
        &self.plan
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn depths(&self) -> Vec<Depth> {
        self.samples.keys().copied().collect()
    }

    pub fn sample_mut(&mut self, depth: Depth) -> Option<&mut WorkingSample> {
        self.samples.get_mut(&depth)
    }

    /// Number of samples that received at least one write.
    pub fn affected(&self) -> usize {
        self.samples
            .values()
            .filter(|ws| !ws.new_layer.is_empty())
            .count()
    }
}

/// One sample inside a working copy: the snapshot it was forked from plus
/// the layer under construction.
#[derive(Debug)]
pub struct WorkingSample {
    base: Sample,
    new_layer: BTreeMap<String, Value>,
}

impl WorkingSample {
    /// Resolve an attribute: the layer under construction first, then the
    /// snapshot's full layer resolution.
    pub fn get(&self, attr: &str) -> Option<&Value> {
        self.new_layer.get(attr).or_else(|| self.base.get(attr))
    }

    /// Write an attribute into the layer under construction.
    pub fn set(&mut self, attr: impl Into<String>, value: Value) {
        self.new_layer.insert(attr.into(), value);
    }

    pub fn has_writes(&self) -> bool {
        !self.new_layer.is_empty()
    }
}
