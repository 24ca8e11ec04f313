//! Filter → search → sort pipeline over a core's materialized samples.
//!
//! The three stages are pure and synchronous; a session caches the
//! intermediate sets so that narrowing a substring search can reuse the
//! previous result instead of rescanning the whole filtered set.

use std::cmp::Ordering;

use crate::error::{Result, StratumError};
use crate::model::{Core, Filter, VirtualSample, View};
use crate::registry::AttributeRegistry;

/// Sort direction for the sort stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// Primary and secondary sort keys, both drawn from the active view.
#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    pub primary: String,
    pub secondary: String,
    pub direction: SortDirection,
}

/// One browse session over a core.
///
/// Holds the materialized virtual samples plus the cached filtered and
/// displayed sets. Changing the view means starting a new session; filter,
/// query, and sort can change freely within one.
#[derive(Debug)]
pub struct BrowseSession<'a> {
    registry: &'a AttributeRegistry,
    view: View,
    filter: Option<Filter>,
    sort: Option<SortSpec>,
    all: Vec<VirtualSample<'a>>,
    filtered: Vec<VirtualSample<'a>>,
    displayed: Vec<VirtualSample<'a>>,
    /// Query and exact flag of the most recent non-empty search.
    previous: Option<(String, bool)>,
    last_search_reused: bool,
}

impl<'a> BrowseSession<'a> {
    /// Materialize the core's virtual sample groups under `view`.
    ///
    /// The view is validated against the registry here — selection time —
    /// so the search and sort stages never see an unknown attribute.
    pub fn new(core: &'a Core, registry: &'a AttributeRegistry, view: View) -> Result<Self> {
        view.validate(registry)?;
        let all: Vec<VirtualSample<'a>> = core
            .virtualize()
            .into_iter()
            .flat_map(|group| group.samples)
            .collect();
        let filtered = all.clone();
        let displayed = filtered.clone();
        Ok(Self {
            registry,
            view,
            filter: None,
            sort: None,
            all,
            filtered,
            displayed,
            previous: None,
            last_search_reused: false,
        })
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    /// The current display sequence, after all three stages.
    pub fn displayed(&self) -> &[VirtualSample<'a>] {
        &self.displayed
    }

    /// Select or clear the active filter. Validated against the registry;
    /// resets the search stage's incremental state.
    pub fn set_filter(&mut self, filter: Option<Filter>) -> Result<()> {
        if let Some(f) = &filter {
            f.validate(self.registry)?;
        }
        self.filter = filter;
        self.refilter();
        // The filtered set changed under the search; restart it.
        let restart_from = self.filtered.clone();
        self.displayed = match &self.previous {
            Some((query, exact)) => self.run_search(&restart_from, query, *exact),
            None => restart_from,
        };
        self.last_search_reused = false;
        self.apply_sort();
        Ok(())
    }

    /// Run the search stage for `query`.
    ///
    /// A non-exact query that contains the immediately preceding non-exact
    /// query re-searches the previous result set — substring matching is
    /// monotonic, so narrowing can only shrink the match set. Every other
    /// edit restarts from the filtered set, since previously excluded
    /// samples could otherwise stay wrongly hidden.
    pub fn set_query(&mut self, query: &str, exact: bool) {
        if query.is_empty() {
            self.displayed = self.filtered.clone();
            self.previous = None;
            self.last_search_reused = false;
            self.apply_sort();
            return;
        }

        let reuse = !exact
            && matches!(
                &self.previous,
                Some((prev, false)) if query.contains(prev.as_str())
            );

        let base = if reuse {
            std::mem::take(&mut self.displayed)
        } else {
            self.filtered.clone()
        };
        self.displayed = self.run_search(&base, query, exact);
        self.previous = Some((query.to_string(), exact));
        self.last_search_reused = reuse;
        self.apply_sort();
    }

    /// Select the sort keys and direction. Both keys must belong to the
    /// active view; this is checked here, at selection time.
    pub fn set_sort(&mut self, primary: &str, secondary: &str, direction: SortDirection) -> Result<()> {
        for key in [primary, secondary] {
            if !self.view.contains(key) {
                return Err(StratumError::UnknownAttribute {
                    attribute: key.to_string(),
                    context: format!("sort keys of view '{}'", self.view.name),
                });
            }
        }
        self.sort = Some(SortSpec {
            primary: primary.to_string(),
            secondary: secondary.to_string(),
            direction,
        });
        self.apply_sort();
        Ok(())
    }

    fn refilter(&mut self) {
        self.filtered = match &self.filter {
            Some(filter) => self
                .all
                .iter()
                .copied()
                .filter(|s| filter.matches(s))
                .collect(),
            None => self.all.clone(),
        };
    }

    fn run_search(
        &self,
        base: &[VirtualSample<'a>],
        query: &str,
        exact: bool,
    ) -> Vec<VirtualSample<'a>> {
        base.iter()
            .copied()
            .filter(|sample| self.sample_matches(sample, query, exact))
            .collect()
    }

    /// A sample matches when at least one attribute of the view matches the
    /// query: formatted equality in exact mode, case-sensitive substring
    /// containment otherwise.
    fn sample_matches(&self, sample: &VirtualSample<'a>, query: &str, exact: bool) -> bool {
        self.view.iter().any(|attr| {
            let formatted = self.registry.format_value(attr, sample.get(attr).as_ref());
            if exact {
                formatted == query
            } else {
                formatted.contains(query)
            }
        })
    }

    fn apply_sort(&mut self) {
        let Some(spec) = self.sort.clone() else {
            return;
        };
        self.displayed.sort_by(|a, b| {
            for key in [&spec.primary, &spec.secondary] {
                let ord = compare_with_undefined_last(
                    a.get(key).as_ref(),
                    b.get(key).as_ref(),
                    spec.direction,
                );
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }

    #[cfg(test)]
    pub(crate) fn last_search_reused(&self) -> bool {
        self.last_search_reused
    }
}

/// Compare two optional values for the sort stage.
///
/// An undefined value sorts after any defined value for both elements,
/// regardless of the requested direction; only present-vs-present
/// comparisons are reversed by a descending sort.
fn compare_with_undefined_last(
    a: Option<&crate::model::Value>,
    b: Option<&crate::model::Value>,
    direction: SortDirection,
) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => {
            let ord = a.total_cmp(b);
            match direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FilterCombine, FilterOp, FilterRule, Sample, Value};
    use crate::registry::{AttributeDef, AttributeType};
    use std::collections::BTreeMap;
    use test_case::test_case;

    fn registry() -> AttributeRegistry {
        let mut r = AttributeRegistry::with_builtins();
        r.register(AttributeDef::new("temp", AttributeType::Float));
        r.register(AttributeDef::new("source", AttributeType::Text));
        r
    }

    fn core() -> Core {
        let mut core = Core::new("X");
        for (depth, temp, source, id) in [
            (10.0, Some(3.0), "lakebed", "s-10"),
            (20.0, None, "lakebed", "s-20"),
            (30.0, Some(1.0), "ocean shelf", "s-30"),
        ] {
            let mut input = BTreeMap::new();
            input.insert("depth".to_string(), Value::Float(depth));
            if let Some(t) = temp {
                input.insert("temp".to_string(), Value::Float(t));
            }
            input.insert("source".to_string(), Value::Text(source.to_string()));
            input.insert("id".to_string(), Value::Text(id.to_string()));
            core.add(Sample::new(input)).unwrap();
        }
        core
    }

    fn view() -> View {
        View::new(
            "All",
            vec![
                "depth".to_string(),
                "temp".to_string(),
                "source".to_string(),
            ],
        )
    }

    fn displayed_depths(session: &BrowseSession<'_>) -> Vec<f64> {
        session
            .displayed()
            .iter()
            .map(|s| s.depth().unwrap().value())
            .collect()
    }

    #[test]
    fn test_no_stages_shows_everything_in_order() {
        let core = core();
        let registry = registry();
        let session = BrowseSession::new(&core, &registry, view()).unwrap();
        assert_eq!(displayed_depths(&session), vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_filter_stage_preserves_order() {
        let core = core();
        let registry = registry();
        let mut session = BrowseSession::new(&core, &registry, view()).unwrap();
        session
            .set_filter(Some(Filter::new(
                "has temp",
                FilterCombine::All,
                vec![FilterRule::new("temp", FilterOp::Defined, None)],
            )))
            .unwrap();
        assert_eq!(displayed_depths(&session), vec![10.0, 30.0]);
    }

    #[test]
    fn test_empty_query_passes_everything() {
        let core = core();
        let registry = registry();
        let mut session = BrowseSession::new(&core, &registry, view()).unwrap();
        session.set_query("", false);
        assert_eq!(displayed_depths(&session), vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_substring_search_matches_any_view_attribute() {
        let core = core();
        let registry = registry();
        let mut session = BrowseSession::new(&core, &registry, view()).unwrap();
        session.set_query("ocean", false);
        assert_eq!(displayed_depths(&session), vec![30.0]);
    }

    #[test]
    fn test_search_is_case_sensitive() {
        let core = core();
        let registry = registry();
        let mut session = BrowseSession::new(&core, &registry, view()).unwrap();
        session.set_query("Ocean", false);
        assert!(session.displayed().is_empty());
    }

    #[test]
    fn test_exact_search_requires_full_equality() {
        let core = core();
        let registry = registry();
        let mut session = BrowseSession::new(&core, &registry, view()).unwrap();
        session.set_query("lake", true);
        assert!(session.displayed().is_empty());
        session.set_query("lakebed", true);
        assert_eq!(displayed_depths(&session), vec![10.0, 20.0]);
    }

    #[test]
    fn test_narrowing_query_reuses_previous_results() {
        let core = core();
        let registry = registry();
        let mut session = BrowseSession::new(&core, &registry, view()).unwrap();

        session.set_query("lake", false);
        assert!(!session.last_search_reused());
        let broad = displayed_depths(&session);

        session.set_query("lakebed", false);
        assert!(session.last_search_reused());
        let narrow = displayed_depths(&session);

        // Monotonic: the narrower set is a subset of the broader one.
        assert!(narrow.iter().all(|d| broad.contains(d)));
        assert_eq!(narrow, vec![10.0, 20.0]);
    }

    #[test_case("lakebed", "lake"; "shorter query")]
    #[test_case("lakebed", "ocean"; "unrelated query")]
    fn test_other_edits_restart_from_filtered_set(first: &str, second: &str) {
        let core = core();
        let registry = registry();
        let mut session = BrowseSession::new(&core, &registry, view()).unwrap();

        session.set_query(first, false);
        session.set_query(second, false);
        assert!(!session.last_search_reused());

        // Results match a fresh search from scratch.
        let mut fresh = BrowseSession::new(&core, &registry, view()).unwrap();
        fresh.set_query(second, false);
        assert_eq!(displayed_depths(&session), displayed_depths(&fresh));
    }

    #[test]
    fn test_exact_toggle_restarts_from_filtered_set() {
        let core = core();
        let registry = registry();
        let mut session = BrowseSession::new(&core, &registry, view()).unwrap();

        session.set_query("lakebed", true);
        // Superstring of the previous query, but the previous search was
        // exact: must not reuse.
        session.set_query("lakebed x", false);
        assert!(!session.last_search_reused());
    }

    #[test]
    fn test_sort_ascending_puts_undefined_last() {
        let core = core();
        let registry = registry();
        let mut session = BrowseSession::new(&core, &registry, view()).unwrap();
        session
            .set_sort("temp", "depth", SortDirection::Ascending)
            .unwrap();
        // temp values by depth: 10 -> 3.0, 20 -> None, 30 -> 1.0
        assert_eq!(displayed_depths(&session), vec![30.0, 10.0, 20.0]);
    }

    #[test]
    fn test_sort_descending_keeps_undefined_last() {
        let core = core();
        let registry = registry();
        let mut session = BrowseSession::new(&core, &registry, view()).unwrap();
        session
            .set_sort("temp", "depth", SortDirection::Descending)
            .unwrap();
        assert_eq!(displayed_depths(&session), vec![10.0, 30.0, 20.0]);
    }

    #[test]
    fn test_secondary_key_breaks_ties() {
        let mut core = core();
        // Another lakebed sample with the same temp as depth 10.
        let mut input = BTreeMap::new();
        input.insert("depth".to_string(), Value::Float(5.0));
        input.insert("temp".to_string(), Value::Float(3.0));
        input.insert("source".to_string(), Value::Text("lakebed".to_string()));
        core.add(Sample::new(input)).unwrap();

        let registry = registry();
        let mut session = BrowseSession::new(&core, &registry, view()).unwrap();
        session
            .set_sort("temp", "depth", SortDirection::Ascending)
            .unwrap();
        assert_eq!(displayed_depths(&session), vec![30.0, 5.0, 10.0, 20.0]);
    }

    #[test]
    fn test_sort_key_outside_view_is_configuration_error() {
        let core = core();
        let registry = registry();
        let mut session = BrowseSession::new(&core, &registry, View::new("narrow", vec!["depth".to_string()])).unwrap();
        let err = session
            .set_sort("temp", "depth", SortDirection::Ascending)
            .unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_ATTRIBUTE");
    }

    #[test]
    fn test_unknown_view_attribute_fails_at_session_start() {
        let core = core();
        let registry = registry();
        let err =
            BrowseSession::new(&core, &registry, View::new("bad", vec!["salinity".to_string()]))
                .unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_ATTRIBUTE");
    }

    #[test]
    fn test_filter_change_restarts_search() {
        let core = core();
        let registry = registry();
        let mut session = BrowseSession::new(&core, &registry, view()).unwrap();

        session.set_query("lakebed", false);
        assert_eq!(displayed_depths(&session), vec![10.0, 20.0]);

        // Filtering to defined temps must drop depth 20 from the search
        // result even though the query did not change.
        session
            .set_filter(Some(Filter::new(
                "has temp",
                FilterCombine::All,
                vec![FilterRule::new("temp", FilterOp::Defined, None)],
            )))
            .unwrap();
        assert_eq!(displayed_depths(&session), vec![10.0]);
    }
}
