//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command. Every command opens
//! the repository, performs its work through the library, and saves the
//! repository again when it changed something.

use std::fs;
use std::path::Path;

use log::{info, warn};

use crate::browse::{BrowseSession, SortDirection};
use crate::error::{Result, StratumError};
use crate::export::export_rows;
use crate::import::{import_rows, ImportOptions};
use crate::model::Depth;
use crate::plan::{CancelToken, ComputationPlan, Executor, RunOutcome, StepDef, WorkflowDef};
use crate::registry::{AttributeDef, AttributeType};
use crate::store::{Datastore, JsonFileBackend};

fn open(repo: &Path) -> Result<(JsonFileBackend, Datastore)> {
    let backend = JsonFileBackend::open(repo)?;
    let store = Datastore::open(&backend)?;
    Ok((backend, store))
}

/// Create an empty repository.
pub fn init(repo: &Path) -> Result<()> {
    info!("Initializing repository at: {}", repo.display());

    let (backend, mut store) = open(repo)?;
    store.save(&backend)?;

    println!("Repository created: {}", repo.display());
    println!("Attributes: {}", store.attributes.len());

    Ok(())
}

/// List declared attributes.
pub fn attributes(repo: &Path) -> Result<()> {
    let (_backend, store) = open(repo)?;

    println!("Attributes:");
    for def in store.attributes.iter() {
        match &def.unit {
            Some(unit) => println!("  {} ({}, {})", def.name, def.kind, unit),
            None => println!("  {} ({})", def.name, def.kind),
        }
    }

    Ok(())
}

/// Declare a new attribute.
pub fn add_attribute(repo: &Path, name: &str, kind: &str, unit: Option<&str>) -> Result<()> {
    let kind = match kind {
        "integer" | "int" => AttributeType::Integer,
        "float" => AttributeType::Float,
        "text" => AttributeType::Text,
        "boolean" | "bool" => AttributeType::Boolean,
        other => {
            return Err(StratumError::TypeConversion {
                attribute: name.to_string(),
                raw: other.to_string(),
                expected: "integer, float, text, or boolean".to_string(),
            })
        }
    };

    let (backend, mut store) = open(repo)?;
    let mut def = AttributeDef::new(name, kind);
    if let Some(unit) = unit {
        def = def.with_unit(unit);
    }
    store.attributes.register(def);
    store.mark_modified();
    store.save(&backend)?;

    println!("Registered attribute '{}' ({})", name, kind);
    Ok(())
}

/// Import samples from a CSV file into a core.
pub fn import(repo: &Path, core: &str, file: &Path, source: Option<&str>) -> Result<()> {
    info!("Importing {} into core '{}'", file.display(), core);

    let bytes = fs::read(file)?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(bytes.as_slice());
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect::<Vec<String>>());
    }

    if rows.is_empty() {
        warn!("{} contains no data rows", file.display());
        println!("Nothing to import: {} has no data rows.", file.display());
        return Ok(());
    }

    let (backend, mut store) = open(repo)?;
    let options = ImportOptions {
        core_name: core.to_string(),
        source: source.map(str::to_string),
    };
    let outcome = import_rows(&mut store, &options, &headers, &rows, &bytes)?;
    store.save(&backend)?;

    println!(
        "Core '{}' {}: {} rows imported",
        outcome.core_name,
        if outcome.created_core { "created" } else { "updated" },
        outcome.rows
    );
    Ok(())
}

/// List cores.
pub fn cores(repo: &Path) -> Result<()> {
    let (_backend, store) = open(repo)?;

    if store.cores.is_empty() {
        println!("No cores. Import samples to begin.");
        return Ok(());
    }

    println!("Cores:");
    for (name, core) in &store.cores {
        let plans = core.plan_names();
        if plans.is_empty() {
            println!("  {} ({} samples)", name, core.len());
        } else {
            println!(
                "  {} ({} samples; plans: {})",
                name,
                core.len(),
                plans.into_iter().collect::<Vec<_>>().join(", ")
            );
        }
    }
    Ok(())
}

/// Show one core's samples and layers.
pub fn show(repo: &Path, core_name: &str) -> Result<()> {
    let (_backend, store) = open(repo)?;
    let core = store.core(core_name)?;

    println!("Core: {}", core.name());
    println!("Samples: {}", core.len());
    println!("Modified: {}", core.modified_at().format("%Y-%m-%d %H:%M:%S"));
    if let Some(provenance) = core.provenance() {
        println!(
            "Imported: {} (sha256 {})",
            provenance.imported_at.format("%Y-%m-%d %H:%M:%S"),
            &provenance.fingerprint[..12.min(provenance.fingerprint.len())]
        );
    }

    for group in core.virtualize() {
        let label = group.plan.as_deref().unwrap_or("input");
        println!("\n[{}] {} samples", label, group.samples.len());
        for sample in &group.samples {
            let depth = sample
                .depth()
                .map(|d| d.to_string())
                .unwrap_or_else(|| "?".to_string());
            println!("  depth {}", depth);
        }
    }
    Ok(())
}

/// Arguments of the `browse` command.
pub struct BrowseArgs<'a> {
    pub core: &'a str,
    pub view: &'a str,
    pub filter: Option<&'a str>,
    pub search: Option<&'a str>,
    pub exact: bool,
    pub sort_by: &'a str,
    pub then_by: &'a str,
    pub descending: bool,
    pub export: Option<&'a Path>,
}

/// Browse a core through the filter → search → sort pipeline.
pub fn browse(repo: &Path, args: &BrowseArgs<'_>) -> Result<()> {
    let (_backend, store) = open(repo)?;
    let core = store.core(args.core)?;
    let view = store.view(args.view)?.clone();

    let mut session = BrowseSession::new(core, &store.attributes, view)?;

    if let Some(filter_name) = args.filter {
        let filter = store.filter(filter_name)?.clone();
        println!("Filter: {}", filter.describe());
        session.set_filter(Some(filter))?;
    }
    if let Some(query) = args.search {
        session.set_query(query, args.exact);
    }
    let direction = if args.descending {
        SortDirection::Descending
    } else {
        SortDirection::Ascending
    };
    session.set_sort(args.sort_by, args.then_by, direction)?;

    let rows = export_rows(session.displayed(), session.view(), &store.attributes);

    match args.export {
        Some(path) => {
            let mut writer = csv::Writer::from_path(path)?;
            for row in &rows {
                writer.write_record(row)?;
            }
            writer.flush()?;
            println!("Wrote {} samples to {}", rows.len() - 1, path.display());
        }
        None => {
            for row in &rows {
                println!("{}", row.join("\t"));
            }
            println!("\n{} samples displayed", rows.len() - 1);
        }
    }
    Ok(())
}

/// Register a workflow from a JSON step list.
pub fn add_workflow(repo: &Path, name: &str, file: &Path) -> Result<()> {
    let content = fs::read_to_string(file)?;
    let steps: Vec<StepDef> = serde_json::from_str(&content)?;

    let (backend, mut store) = open(repo)?;
    store
        .workflows
        .insert(name.to_string(), WorkflowDef::new(name, steps));
    store.mark_modified();
    store.save(&backend)?;

    println!("Registered workflow '{}'", name);
    Ok(())
}

/// Register a computation plan bound to a workflow.
pub fn add_plan(repo: &Path, name: &str, workflow: &str, description: Option<&str>) -> Result<()> {
    let (backend, mut store) = open(repo)?;

    if !store.workflows.contains_key(workflow) {
        return Err(StratumError::NotFound {
            kind: "workflow".to_string(),
            name: workflow.to_string(),
        });
    }

    let mut plan = ComputationPlan::new(name, workflow);
    if let Some(description) = description {
        plan = plan.with_description(description);
    }
    store.computation_plans.insert(name.to_string(), plan);
    store.mark_modified();
    store.save(&backend)?;

    println!("Registered plan '{}' running workflow '{}'", name, workflow);
    Ok(())
}

/// List computation plans and workflows.
pub fn plans(repo: &Path) -> Result<()> {
    let (_backend, store) = open(repo)?;

    println!("Workflows:");
    for (name, def) in &store.workflows {
        println!("  {} ({} steps)", name, def.steps.len());
    }

    println!("Computation plans:");
    for (name, plan) in &store.computation_plans {
        match &plan.description {
            Some(desc) => println!("  {} -> {} ({})", name, plan.workflow, desc),
            None => println!("  {} -> {}", name, plan.workflow),
        }
    }
    Ok(())
}

/// Run a computation plan on a core.
pub fn run(repo: &Path, core_name: &str, plan_name: &str) -> Result<()> {
    info!("Running plan '{}' on core '{}'", plan_name, core_name);

    let (backend, mut store) = open(repo)?;
    let plan = store.plan(plan_name)?.clone();
    let workflow = store.workflow_for(&plan)?.build();

    let executor = Executor::new();
    let handle = executor.start(store.core(core_name)?, &plan, workflow, CancelToken::new())?;
    println!("Applying computation '{}' to core '{}'...", plan_name, core_name);

    let outcome = handle.finish(store.core_mut(core_name)?);
    match outcome {
        RunOutcome::Committed => {
            store.mark_modified();
            store.save(&backend)?;
            println!("Committed: layer '{}' added.", plan_name);
        }
        RunOutcome::Failed(e) => {
            warn!("plan '{}' failed: {}", plan_name, e);
            println!("Failed: {}", e);
            println!("All partial results were rolled back.");
        }
        RunOutcome::Aborted => {
            println!("Aborted: no layer was added.");
        }
    }
    Ok(())
}

/// Strip a plan's layer from every sample of a core.
pub fn strip(repo: &Path, core_name: &str, plan_name: &str) -> Result<()> {
    let (backend, mut store) = open(repo)?;

    let stripped = store.core_mut(core_name)?.strip_experiment(plan_name);
    if stripped > 0 {
        store.mark_modified();
        store.save(&backend)?;
    }

    println!(
        "Stripped layer '{}' from {} samples of core '{}'. (Input data is never removed.)",
        plan_name, stripped, core_name
    );
    Ok(())
}

/// Delete one sample entirely.
pub fn delete_sample(repo: &Path, core_name: &str, depth: f64) -> Result<()> {
    let (backend, mut store) = open(repo)?;

    store.core_mut(core_name)?.remove(Depth(depth))?;
    store.mark_modified();
    store.save(&backend)?;

    println!("Deleted sample at depth {} from core '{}'", depth, core_name);
    Ok(())
}
