//! Opaque persistence backend.
//!
//! The core hands each named model to the backend as a JSON document and
//! gets it back the same way; the on-disk layout and byte format are the
//! backend's concern alone.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Result, StratumError};

/// Extension used by the file-based backend for its model documents.
const MODEL_EXTENSION: &str = "json";

/// Per-model load/save storage.
pub trait Backend {
    /// Load a model document, `None` if the backend has never seen it.
    fn load(&self, model: &str) -> Result<Option<serde_json::Value>>;

    /// Persist a model document, replacing any previous version.
    fn save(&self, model: &str, doc: &serde_json::Value) -> Result<()>;

    /// Names of all models the backend currently holds.
    fn list_models(&self) -> Result<Vec<String>>;
}

/// Backend storing one pretty-printed JSON file per model under a
/// repository directory.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    root: PathBuf,
}

impl JsonFileBackend {
    /// Open (creating if necessary) a repository directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if root.exists() && !root.is_dir() {
            return Err(StratumError::InvalidRepository { path: root });
        }
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn model_path(&self, model: &str) -> PathBuf {
        self.root.join(format!("{}.{}", model, MODEL_EXTENSION))
    }
}

impl Backend for JsonFileBackend {
    fn load(&self, model: &str) -> Result<Option<serde_json::Value>> {
        let path = self.model_path(model);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let doc = serde_json::from_str(&content)?;
        tracing::debug!(model, path = %path.display(), "loaded model document");
        Ok(Some(doc))
    }

    fn save(&self, model: &str, doc: &serde_json::Value) -> Result<()> {
        let path = self.model_path(model);
        let content = serde_json::to_string_pretty(doc)?;
        fs::write(&path, content)?;
        tracing::debug!(model, path = %path.display(), "saved model document");
        Ok(())
    }

    fn list_models(&self) -> Result<Vec<String>> {
        let mut models: Vec<String> = WalkDir::new(&self.root)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let path = entry.path();
                match path.extension().and_then(|e| e.to_str()) {
                    Some(MODEL_EXTENSION) => path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .map(str::to_string),
                    _ => None,
                }
            })
            .collect();
        models.sort();
        Ok(models)
    }
}
