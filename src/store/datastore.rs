//! The application context holding every loaded model.
//!
//! Constructed explicitly from a backend when a repository is opened and
//! dropped when it closes; nothing here is a global. All mutation of the
//! loaded models flows through this context, which tracks whether anything
//! needs saving.

use std::collections::BTreeMap;

use crate::error::{Result, StratumError};
use crate::model::{Core, Filter, View};
use crate::plan::{ComputationPlan, WorkflowDef};
use crate::registry::AttributeRegistry;
use crate::store::backend::Backend;

/// Loaded repository state.
#[derive(Debug)]
pub struct Datastore {
    pub attributes: AttributeRegistry,
    pub cores: BTreeMap<String, Core>,
    pub views: BTreeMap<String, View>,
    pub filters: BTreeMap<String, Filter>,
    pub workflows: BTreeMap<String, WorkflowDef>,
    pub computation_plans: BTreeMap<String, ComputationPlan>,
    modified: bool,
}

impl Datastore {
    /// Load every model from the backend.
    ///
    /// A repository that has never been saved starts with the built-in
    /// attributes and the "All" view.
    pub fn open(backend: &dyn Backend) -> Result<Self> {
        let attributes: AttributeRegistry = match load_model(backend, "attributes")? {
            Some(registry) => registry,
            None => AttributeRegistry::with_builtins(),
        };

        // The "All" view always mirrors the current registry, so attributes
        // registered since the last save still show up in it.
        let mut views: BTreeMap<String, View> =
            load_model(backend, "views")?.unwrap_or_default();
        views.insert("All".to_string(), View::all(&attributes));

        let store = Self {
            attributes,
            cores: load_model(backend, "cores")?.unwrap_or_default(),
            views,
            filters: load_model(backend, "filters")?.unwrap_or_default(),
            workflows: load_model(backend, "workflows")?.unwrap_or_default(),
            computation_plans: load_model(backend, "computation_plans")?.unwrap_or_default(),
            modified: false,
        };
        tracing::info!(
            cores = store.cores.len(),
            views = store.views.len(),
            filters = store.filters.len(),
            plans = store.computation_plans.len(),
            "repository opened"
        );
        Ok(store)
    }

    /// Persist every model and clear the modified flag.
    pub fn save(&mut self, backend: &dyn Backend) -> Result<()> {
        save_model(backend, "attributes", &self.attributes)?;
        save_model(backend, "cores", &self.cores)?;
        save_model(backend, "views", &self.views)?;
        save_model(backend, "filters", &self.filters)?;
        save_model(backend, "workflows", &self.workflows)?;
        save_model(backend, "computation_plans", &self.computation_plans)?;
        self.modified = false;
        tracing::info!("repository saved");
        Ok(())
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn mark_modified(&mut self) {
        self.modified = true;
    }

    // ── Lookup helpers (NotFound over panics) ──

    pub fn core(&self, name: &str) -> Result<&Core> {
        self.cores.get(name).ok_or_else(|| not_found("core", name))
    }

    pub fn core_mut(&mut self, name: &str) -> Result<&mut Core> {
        self.cores
            .get_mut(name)
            .ok_or_else(|| not_found("core", name))
    }

    pub fn view(&self, name: &str) -> Result<&View> {
        self.views.get(name).ok_or_else(|| not_found("view", name))
    }

    pub fn filter(&self, name: &str) -> Result<&Filter> {
        self.filters
            .get(name)
            .ok_or_else(|| not_found("filter", name))
    }

    pub fn plan(&self, name: &str) -> Result<&ComputationPlan> {
        self.computation_plans
            .get(name)
            .ok_or_else(|| not_found("computation plan", name))
    }

    /// The workflow definition a plan runs.
    pub fn workflow_for(&self, plan: &ComputationPlan) -> Result<&WorkflowDef> {
        self.workflows
            .get(&plan.workflow)
            .ok_or_else(|| not_found("workflow", &plan.workflow))
    }
}

fn not_found(kind: &str, name: &str) -> StratumError {
    StratumError::NotFound {
        kind: kind.to_string(),
        name: name.to_string(),
    }
}

fn load_model<T: serde::de::DeserializeOwned>(
    backend: &dyn Backend,
    model: &str,
) -> Result<Option<T>> {
    match backend.load(model) {
        Ok(Some(doc)) => serde_json::from_value(doc)
            .map(Some)
            .map_err(|e| StratumError::ModelLoad {
                model: model.to_string(),
                source: Box::new(StratumError::Serialization(e)),
            }),
        Ok(None) => Ok(None),
        Err(e) => Err(StratumError::ModelLoad {
            model: model.to_string(),
            source: Box::new(e),
        }),
    }
}

fn save_model<T: serde::Serialize>(backend: &dyn Backend, model: &str, value: &T) -> Result<()> {
    backend.save(model, &serde_json::to_value(value)?)
}
