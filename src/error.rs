//! Error handling for Stratum
//!
//! Configuration problems (unknown attributes, unparseable import values)
//! surface at the point of selection or import; computation failures are
//! caught by the executor and reported after rollback. Cancellation is not
//! an error and has no variant here.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for Stratum operations
pub type Result<T> = std::result::Result<T, StratumError>;

/// Main error type for Stratum operations
#[derive(Error, Debug)]
pub enum StratumError {
    // Configuration Errors
    #[error("Unknown attribute '{attribute}' in {context}")]
    UnknownAttribute { attribute: String, context: String },

    #[error("Cannot convert '{raw}' to {expected} for attribute '{attribute}'")]
    TypeConversion {
        attribute: String,
        raw: String,
        expected: String,
    },

    #[error("Import input has no 'depth' column")]
    MissingDepthColumn,

    #[error("Import row {row} has no 'depth' value")]
    MissingDepth { row: usize },

    #[error("Import row {row}: {source}")]
    ImportRow {
        row: usize,
        #[source]
        source: Box<StratumError>,
    },

    // Lookup Errors
    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    #[error("No sample at depth {depth} in core '{core}'")]
    SampleNotFound { core: String, depth: f64 },

    #[error("Sample has no 'depth' value in its input layer")]
    SampleWithoutDepth,

    // Computation Errors
    #[error("Computation plan '{plan}' failed in step '{step}': {reason}")]
    ComputationFailed {
        plan: String,
        step: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Computation plan '{plan}' is already running on core '{core}'")]
    PlanAlreadyRunning { core: String, plan: String },

    #[error("Computation worker for plan '{plan}' terminated without an outcome")]
    WorkerLost { plan: String },

    // Data Model Errors
    #[error("The 'input' layer cannot be removed")]
    ProtectedLayer,

    // Storage Errors
    #[error("Failed to load model '{model}' from the repository")]
    ModelLoad {
        model: String,
        #[source]
        source: Box<StratumError>,
    },

    #[error("Repository path is not usable: {}", path.display())]
    InvalidRepository { path: PathBuf },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Tabular file errors (CLI import/export)
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl StratumError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            StratumError::UnknownAttribute { .. } => "UNKNOWN_ATTRIBUTE",
            StratumError::TypeConversion { .. } => "TYPE_CONVERSION",
            StratumError::MissingDepthColumn => "MISSING_DEPTH_COLUMN",
            StratumError::MissingDepth { .. } => "MISSING_DEPTH",
            StratumError::ImportRow { .. } => "IMPORT_ROW",
            StratumError::NotFound { .. } => "NOT_FOUND",
            StratumError::SampleNotFound { .. } => "SAMPLE_NOT_FOUND",
            StratumError::SampleWithoutDepth => "SAMPLE_WITHOUT_DEPTH",
            StratumError::ComputationFailed { .. } => "COMPUTATION_FAILED",
            StratumError::PlanAlreadyRunning { .. } => "PLAN_ALREADY_RUNNING",
            StratumError::WorkerLost { .. } => "WORKER_LOST",
            StratumError::ProtectedLayer => "PROTECTED_LAYER",
            StratumError::ModelLoad { .. } => "MODEL_LOAD",
            StratumError::InvalidRepository { .. } => "INVALID_REPOSITORY",
            StratumError::Io(_) => "IO_ERROR",
            StratumError::Serialization(_) => "SERIALIZATION_ERROR",
            StratumError::Csv(_) => "CSV_ERROR",
        }
    }

    /// Check whether this error is a configuration error the user can fix
    /// by adjusting a view, filter, or import file.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            StratumError::UnknownAttribute { .. }
                | StratumError::TypeConversion { .. }
                | StratumError::MissingDepthColumn
                | StratumError::MissingDepth { .. }
                | StratumError::ImportRow { .. }
        )
    }
}
