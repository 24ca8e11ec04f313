//! Browsing: the filter → search → sort pipeline.

mod pipeline;

pub use pipeline::{BrowseSession, SortDirection, SortSpec};
