//! CLI Module
//!
//! Command-line interface for the Stratum sample repository.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Stratum - layered sample records and derived computation layers
#[derive(Parser, Debug)]
#[command(name = "stratum")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Repository directory
    #[arg(short, long, global = true, default_value = ".stratum")]
    pub repo: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create an empty repository
    #[command(name = "init")]
    Init,

    /// List declared attributes
    #[command(name = "attributes")]
    Attributes,

    /// Declare a new attribute
    #[command(name = "add-attribute")]
    AddAttribute {
        /// Attribute name
        name: String,

        /// Semantic type: integer, float, text, or boolean
        #[arg(short, long, default_value = "float")]
        kind: String,

        /// Engineering unit
        #[arg(short, long)]
        unit: Option<String>,
    },

    /// Import samples from a CSV file
    #[command(name = "import")]
    Import {
        /// Core to create or update
        core: String,

        /// CSV file with a header row; a 'depth' column is required
        file: PathBuf,

        /// Value for a 'source' attribute on rows that lack one
        #[arg(short, long)]
        source: Option<String>,
    },

    /// List cores
    #[command(name = "cores")]
    Cores,

    /// Show one core's samples and layers
    #[command(name = "show")]
    Show {
        /// Core name
        core: String,
    },

    /// Browse a core through filter, search, and sort
    #[command(name = "browse")]
    Browse {
        /// Core name
        core: String,

        /// View selecting the visible attributes
        #[arg(long, default_value = "All")]
        view: String,

        /// Named filter to apply
        #[arg(long)]
        filter: Option<String>,

        /// Text search over the view's attributes
        #[arg(long)]
        search: Option<String>,

        /// Exact match instead of substring containment
        #[arg(long)]
        exact: bool,

        /// Primary sort attribute
        #[arg(long, default_value = "depth")]
        sort_by: String,

        /// Secondary sort attribute
        #[arg(long, default_value = "computation plan")]
        then_by: String,

        /// Sort descending
        #[arg(long)]
        descending: bool,

        /// Write the displayed rows to a CSV file instead of stdout
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Register a workflow from a JSON step list
    #[command(name = "add-workflow")]
    AddWorkflow {
        /// Workflow name
        name: String,

        /// JSON file holding the step definitions
        file: PathBuf,
    },

    /// Register a computation plan bound to a workflow
    #[command(name = "add-plan")]
    AddPlan {
        /// Plan name (also the layer name it produces)
        name: String,

        /// Workflow the plan runs
        workflow: String,

        /// Plan description
        #[arg(short, long)]
        description: Option<String>,
    },

    /// List computation plans and workflows
    #[command(name = "plans")]
    Plans,

    /// Run a computation plan on a core
    #[command(name = "run")]
    Run {
        /// Core name
        core: String,

        /// Plan name
        plan: String,
    },

    /// Strip a plan's layer from every sample of a core
    #[command(name = "strip")]
    Strip {
        /// Core name
        core: String,

        /// Plan name
        plan: String,
    },

    /// Delete one sample entirely
    #[command(name = "delete-sample")]
    DeleteSample {
        /// Core name
        core: String,

        /// Depth of the sample to delete
        depth: f64,
    },
}
