//! Tabular export: the displayed sample sequence rendered as rows.
//!
//! Column order comes from the active view's iteration (fixed `id`,
//! `computation plan` prefix first); cell formatting delegates to the
//! attribute registry. Writing the rows to a file is the CLI layer's job.

use crate::model::{View, VirtualSample};
use crate::registry::AttributeRegistry;

/// Render the displayed sequence as a header row plus one formatted row
/// per sample.
pub fn export_rows(
    displayed: &[VirtualSample<'_>],
    view: &View,
    registry: &AttributeRegistry,
) -> Vec<Vec<String>> {
    let mut rows = Vec::with_capacity(displayed.len() + 1);
    rows.push(view.iter().map(str::to_string).collect());
    for sample in displayed {
        rows.push(
            view.iter()
                .map(|attr| registry.format_value(attr, sample.get(attr).as_ref()))
                .collect(),
        );
    }
    rows
}
