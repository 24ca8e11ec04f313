//! Tabular import: raw rows in, input-layer samples out.
//!
//! Every cell is converted through the attribute registry before any
//! sample is touched, so a bad file rejects cleanly with the offending
//! row and column named and the repository unchanged. File mechanics
//! (CSV parsing) live in the CLI layer; this module consumes rows that
//! are already header-aligned strings.

use std::collections::BTreeMap;

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::error::{Result, StratumError};
use crate::model::{Core, ImportProvenance, Sample, Value};
use crate::registry::DEPTH_ATTRIBUTE;
use crate::store::Datastore;

/// How an import run should land in the repository.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Core to create or update.
    pub core_name: String,
    /// Optional `source` label stamped on every row that lacks one.
    pub source: Option<String>,
}

/// Summary of a finished import.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportOutcome {
    pub core_name: String,
    pub rows: usize,
    pub created_core: bool,
    /// SHA-256 fingerprint of the imported bytes.
    pub fingerprint: String,
}

/// Convert header-aligned raw rows into typed attribute maps.
///
/// Fails on the first unknown column or unparseable cell, naming the row
/// (1-based, excluding the header). Empty cells become undefined and are
/// simply absent from the map; a row whose `depth` ends up undefined is an
/// error.
pub fn convert_rows(
    store: &Datastore,
    headers: &[String],
    rows: &[Vec<String>],
) -> Result<Vec<BTreeMap<String, Value>>> {
    if !headers.iter().any(|h| h == DEPTH_ATTRIBUTE) {
        return Err(StratumError::MissingDepthColumn);
    }

    let mut converted = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let row_number = index + 1;
        let mut attrs = BTreeMap::new();
        for (header, raw) in headers.iter().zip(row.iter()) {
            let value = store
                .attributes
                .convert_value(header, raw)
                .map_err(|e| StratumError::ImportRow {
                    row: row_number,
                    source: Box::new(e),
                })?;
            if let Some(value) = value {
                attrs.insert(header.clone(), value);
            }
        }
        if !attrs.contains_key(DEPTH_ATTRIBUTE) {
            return Err(StratumError::MissingDepth { row: row_number });
        }
        converted.push(attrs);
    }
    Ok(converted)
}

/// Import rows into the named core, creating it on first use.
///
/// Conversion happens up front; only a fully convertible input mutates the
/// repository. Existing samples at the same depth are merged, matching the
/// insert-or-update contract of [`Core::add`].
pub fn import_rows(
    store: &mut Datastore,
    options: &ImportOptions,
    headers: &[String],
    rows: &[Vec<String>],
    raw_bytes: &[u8],
) -> Result<ImportOutcome> {
    let converted = convert_rows(store, headers, rows)?;

    let created_core = !store.cores.contains_key(&options.core_name);
    let core = store
        .cores
        .entry(options.core_name.clone())
        .or_insert_with(|| Core::new(options.core_name.clone()));

    for mut attrs in converted {
        if let Some(source) = &options.source {
            attrs
                .entry("source".to_string())
                .or_insert_with(|| Value::Text(source.clone()));
        }
        core.add(Sample::new(attrs))?;
    }

    let fingerprint = fingerprint(raw_bytes);
    core.set_provenance(ImportProvenance {
        source: options.source.clone(),
        fingerprint: fingerprint.clone(),
        imported_at: Utc::now(),
    });
    store.mark_modified();

    log::info!(
        "imported {} rows into core '{}'{}",
        rows.len(),
        options.core_name,
        if created_core { " (new core)" } else { "" }
    );

    Ok(ImportOutcome {
        core_name: options.core_name.clone(),
        rows: rows.len(),
        created_core,
        fingerprint,
    })
}

/// SHA-256 fingerprint of the imported bytes, as lowercase hex.
fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Depth;
    use crate::registry::{AttributeDef, AttributeType};
    use crate::store::JsonFileBackend;
    use tempfile::tempdir;

    fn store() -> Datastore {
        let dir = tempdir().unwrap();
        let backend = JsonFileBackend::open(dir.path()).unwrap();
        let mut store = Datastore::open(&backend).unwrap();
        store
            .attributes
            .register(AttributeDef::new("temp", AttributeType::Float));
        store
            .attributes
            .register(AttributeDef::new("source", AttributeType::Text));
        store
    }

    fn headers() -> Vec<String> {
        vec!["depth".to_string(), "temp".to_string()]
    }

    fn rows() -> Vec<Vec<String>> {
        vec![
            vec!["10".to_string(), "5".to_string()],
            vec!["20".to_string(), "".to_string()],
            vec!["30".to_string(), "7".to_string()],
        ]
    }

    #[test]
    fn test_import_creates_core_with_input_samples() {
        let mut store = store();
        let options = ImportOptions {
            core_name: "X".to_string(),
            source: None,
        };

        let outcome = import_rows(&mut store, &options, &headers(), &rows(), b"raw").unwrap();
        assert_eq!(outcome.rows, 3);
        assert!(outcome.created_core);
        assert!(store.is_modified());

        let core = store.core("X").unwrap();
        assert_eq!(core.len(), 3);
        assert_eq!(
            core.get(Depth(10.0)).unwrap().get("temp"),
            Some(&Value::Float(5.0))
        );
        // Empty cell imported as undefined, not as an error.
        assert_eq!(core.get(Depth(20.0)).unwrap().get("temp"), None);
        assert_eq!(core.provenance().unwrap().fingerprint, fingerprint(b"raw"));
    }

    #[test]
    fn test_reimport_merges_by_depth() {
        let mut store = store();
        let options = ImportOptions {
            core_name: "X".to_string(),
            source: None,
        };
        import_rows(&mut store, &options, &headers(), &rows(), b"v1").unwrap();

        let update = vec![vec!["10".to_string(), "5.5".to_string()]];
        let outcome = import_rows(&mut store, &options, &headers(), &update, b"v2").unwrap();
        assert!(!outcome.created_core);

        let core = store.core("X").unwrap();
        assert_eq!(core.len(), 3);
        assert_eq!(
            core.get(Depth(10.0)).unwrap().get("temp"),
            Some(&Value::Float(5.5))
        );
    }

    #[test]
    fn test_source_label_fills_missing_source_only() {
        let mut store = store();
        let options = ImportOptions {
            core_name: "X".to_string(),
            source: Some("survey-a".to_string()),
        };
        let headers = vec![
            "depth".to_string(),
            "source".to_string(),
        ];
        let rows = vec![
            vec!["10".to_string(), "".to_string()],
            vec!["20".to_string(), "explicit".to_string()],
        ];
        import_rows(&mut store, &options, &headers, &rows, b"raw").unwrap();

        let core = store.core("X").unwrap();
        assert_eq!(
            core.get(Depth(10.0)).unwrap().get("source"),
            Some(&Value::Text("survey-a".to_string()))
        );
        assert_eq!(
            core.get(Depth(20.0)).unwrap().get("source"),
            Some(&Value::Text("explicit".to_string()))
        );
    }

    #[test]
    fn test_unparseable_cell_names_row_and_leaves_store_untouched() {
        let mut store = store();
        let options = ImportOptions {
            core_name: "X".to_string(),
            source: None,
        };
        let bad_rows = vec![
            vec!["10".to_string(), "5".to_string()],
            vec!["20".to_string(), "warm".to_string()],
        ];

        let err = import_rows(&mut store, &options, &headers(), &bad_rows, b"raw").unwrap_err();
        assert_eq!(err.error_code(), "IMPORT_ROW");
        assert!(err.to_string().contains("row 2"));
        assert!(err.is_configuration());
        assert!(store.cores.is_empty());
    }

    #[test]
    fn test_missing_depth_column_rejected() {
        let store = store();
        let err = convert_rows(&store, &["temp".to_string()], &[vec!["5".to_string()]])
            .unwrap_err();
        assert_eq!(err.error_code(), "MISSING_DEPTH_COLUMN");
    }

    #[test]
    fn test_row_with_empty_depth_rejected() {
        let store = store();
        let err = convert_rows(
            &store,
            &headers(),
            &[vec!["".to_string(), "5".to_string()]],
        )
        .unwrap_err();
        assert_eq!(err.error_code(), "MISSING_DEPTH");
    }

    #[test]
    fn test_unknown_column_rejected() {
        let store = store();
        let err = convert_rows(
            &store,
            &["depth".to_string(), "salinity".to_string()],
            &[vec!["10".to_string(), "35".to_string()]],
        )
        .unwrap_err();
        assert_eq!(err.error_code(), "IMPORT_ROW");
        assert!(err.to_string().contains("salinity"));
    }
}
