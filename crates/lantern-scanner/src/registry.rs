//! In-memory report registry.
//!
//! The registry is the single source of truth for whether a route is queued:
//! a report exists for a route ID from admission until it is removed by a
//! requeue. It is not synchronized itself; [`RouteScheduler`] owns it behind
//! one lock so that admission checks and inserts happen atomically.
//!
//! [`RouteScheduler`]: crate::RouteScheduler

use indexmap::IndexMap;
use lantern_core::{GroupRoutesKey, RouteId, TaskReport};
use tracing::debug;

/// Route ID to task report, iterated in admission order.
#[derive(Debug, Default)]
pub struct ReportRegistry {
    reports: IndexMap<RouteId, TaskReport>,
    next_generation: u64,
}

impl ReportRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the generation number for the next report.
    pub fn next_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }

    /// Whether a report exists for this route.
    #[must_use]
    pub fn contains(&self, id: &RouteId) -> bool {
        self.reports.contains_key(id)
    }

    /// Get a report by route ID.
    #[must_use]
    pub fn get(&self, id: &RouteId) -> Option<&TaskReport> {
        self.reports.get(id)
    }

    /// Get the report for `id` only if it is still the given generation.
    pub fn get_current_mut(&mut self, id: &RouteId, generation: u64) -> Option<&mut TaskReport> {
        self.reports
            .get_mut(id)
            .filter(|report| report.generation() == generation)
    }

    /// Insert a newly admitted report.
    pub fn insert(&mut self, report: TaskReport) {
        debug!(route_id = %report.id(), generation = report.generation(), "registered report");
        self.reports.insert(report.id().clone(), report);
    }

    /// Replace the stored report with `report` if the stored one has the same
    /// generation. Returns `false` for a stale report.
    pub fn replace_current(&mut self, report: TaskReport) -> bool {
        match self.get_current_mut(report.id(), report.generation()) {
            Some(slot) => {
                *slot = report;
                true
            }
            None => false,
        }
    }

    /// Remove a report, keeping the order of the others.
    pub fn remove(&mut self, id: &RouteId) -> Option<TaskReport> {
        self.reports.shift_remove(id)
    }

    /// Number of reports whose route falls in `group`.
    #[must_use]
    pub fn count_in_group(&self, key: GroupRoutesKey, group: &str) -> usize {
        self.reports
            .values()
            .filter(|report| key.group_of(report.route()) == group)
            .count()
    }

    /// Iterate reports in admission order.
    pub fn iter(&self) -> impl Iterator<Item = &TaskReport> {
        self.reports.values()
    }

    /// Number of reports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lantern_core::{Route, RouteDefinition, TaskStatus};
    use std::path::Path;

    fn report(registry: &mut ReportRegistry, path: &str, group: &str) -> TaskReport {
        let route = Route::new(path).expect("valid route").with_definition(RouteDefinition {
            name: Some(group.to_string()),
            component: None,
        });
        let generation = registry.next_generation();
        TaskReport::new(route, ["capture"], Path::new("out"), generation)
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut registry = ReportRegistry::new();
        let a = report(&mut registry, "/a", "a");
        let id = a.id().clone();

        assert!(!registry.contains(&id));
        registry.insert(a);
        assert!(registry.contains(&id));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&id).map(TaskReport::generation), Some(0));
    }

    #[test]
    fn test_generations_increase() {
        let mut registry = ReportRegistry::new();
        assert_eq!(registry.next_generation(), 0);
        assert_eq!(registry.next_generation(), 1);
        assert_eq!(registry.next_generation(), 2);
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut registry = ReportRegistry::new();
        for path in ["/a", "/b", "/c"] {
            let r = report(&mut registry, path, "x");
            registry.insert(r);
        }
        registry.remove(&RouteId::from_path("/b"));

        let paths: Vec<_> = registry.iter().map(|r| r.route().path().to_string()).collect();
        assert_eq!(paths, vec!["/a", "/c"]);
    }

    #[test]
    fn test_replace_current_rejects_stale_generation() {
        let mut registry = ReportRegistry::new();
        let stale = report(&mut registry, "/a", "a");
        registry.insert(stale.clone());

        // Requeue: the route is re-admitted with a new generation
        registry.remove(stale.id());
        let fresh = report(&mut registry, "/a", "a");
        registry.insert(fresh.clone());

        let mut late = stale;
        late.set_status("capture", TaskStatus::Completed);
        assert!(!registry.replace_current(late));
        assert_eq!(
            registry.get(fresh.id()).and_then(|r| r.status("capture")),
            Some(TaskStatus::Waiting)
        );

        let mut current = fresh;
        current.set_status("capture", TaskStatus::Completed);
        assert!(registry.replace_current(current.clone()));
        assert_eq!(registry.get(current.id()), Some(&current));
    }

    #[test]
    fn test_count_in_group() {
        let mut registry = ReportRegistry::new();
        for (path, group) in [("/a/1", "a"), ("/a/2", "a"), ("/b/1", "b")] {
            let r = report(&mut registry, path, group);
            registry.insert(r);
        }
        assert_eq!(registry.count_in_group(GroupRoutesKey::DefinitionName, "a"), 2);
        assert_eq!(registry.count_in_group(GroupRoutesKey::DefinitionName, "b"), 1);
        assert_eq!(registry.count_in_group(GroupRoutesKey::Path, "a"), 0);
    }
}
