//! Admission filter capping how many routes of one group may be queued.

use crate::registry::ReportRegistry;
use lantern_core::{GroupRoutesKey, Route};

/// Caps the number of queued reports per route group.
///
/// With a limit `L > 0`, a route is rejected once `L` reports whose routes
/// share its group are in the registry. `L <= 0` admits everything.
#[derive(Debug, Clone, Copy)]
pub struct SamplingGate {
    limit: i64,
    key: GroupRoutesKey,
}

impl SamplingGate {
    /// Create a gate with the given per-group limit and group key.
    #[must_use]
    pub fn new(limit: i64, key: GroupRoutesKey) -> Self {
        Self { limit, key }
    }

    /// Group key this gate samples by.
    #[must_use]
    pub fn key(&self) -> GroupRoutesKey {
        self.key
    }

    /// Whether sampling is active.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.limit > 0
    }

    /// Decide whether `route` may be queued given the current registry.
    #[must_use]
    pub fn admit(&self, route: &Route, registry: &ReportRegistry) -> bool {
        if !self.is_enabled() {
            return true;
        }

        let group = self.key.group_of(route);
        let in_group = registry.count_in_group(self.key, group);
        i64::try_from(in_group).map_or(false, |count| count < self.limit)
    }
}
