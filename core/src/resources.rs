use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::{Index, IndexMut};

/// An unordered mapping of resource name to a nonnegative amount. Used
/// uniformly for node capacities, live availabilities, demands and requests.
///
/// Backed by a `BTreeMap` rather than a `HashMap` so two bundles with the
/// same contents always serialize identically, which is what the scheduler's
/// dedup logic and the metrics `freq_of_dicts` helper rely on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceBundle(BTreeMap<String, f64>);

impl ResourceBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, resource: &str) -> f64 {
        self.0.get(resource).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, resource: impl Into<String>, amount: f64) {
        self.0.insert(resource.into(), amount);
    }

    pub fn single(resource: impl Into<String>, amount: f64) -> Self {
        let mut bundle = Self::new();
        bundle.set(resource, amount);
        bundle
    }

    pub fn resources(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, resource: &str) -> bool {
        self.0.contains_key(resource)
    }

    /// Total of all amounts, used as the "resource richness" score for
    /// first-fit-decreasing ordering in the scheduler.
    pub fn richness(&self) -> f64 {
        self.0.values().sum()
    }

    /// `true` iff `self` fits entirely within `capacity`, i.e. for every
    /// resource in `self`, `self[r] <= capacity[r]`.
    pub fn fits_within(&self, capacity: &ResourceBundle) -> bool {
        self.0.iter().all(|(r, &amount)| amount <= capacity.get(r))
    }

    /// Subtract `self` from `capacity`, clamping at zero per resource.
    /// Resources present in `self` but absent from `capacity` are ignored:
    /// a bundle cannot consume capacity a node type doesn't advertise.
    pub fn subtract_from(&self, capacity: &ResourceBundle) -> ResourceBundle {
        let mut remaining = capacity.clone();
        for (resource, amount) in self.resources() {
            if let Some(existing) = remaining.0.get_mut(resource) {
                *existing = (*existing - amount).max(0.0);
            }
        }
        remaining
    }

    /// Is this a single-key, zero-valued bundle (e.g. `{CPU: 0}`)? Such a
    /// bundle is the delete-token convention used by
    /// `ClusterMetrics::set_resource_requests`.
    pub fn is_delete_token(&self) -> bool {
        self.0.len() == 1 && self.0.values().all(|&v| v == 0.0)
    }

    pub fn delete_token_resource(&self) -> Option<&str> {
        if self.is_delete_token() {
            self.0.keys().next().map(|s| s.as_str())
        } else {
            None
        }
    }

    /// Any resource name touched by this bundle, used by the request-merge
    /// logic to decide which stored requests a new set supersedes.
    pub fn touches(&self, resource: &str) -> bool {
        self.0.contains_key(resource)
    }

    pub fn resource_ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|s| s.as_str())
    }
}

impl FromIterator<(String, f64)> for ResourceBundle {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Index<&str> for ResourceBundle {
    type Output = f64;

    fn index(&self, resource: &str) -> &f64 {
        self.0.get(resource).unwrap_or(&0.0)
    }
}

impl IndexMut<&str> for ResourceBundle {
    fn index_mut(&mut self, resource: &str) -> &mut f64 {
        self.0.entry(resource.to_string()).or_insert(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_within_respects_every_resource() {
        let demand = ResourceBundle::from_iter([("CPU".to_string(), 2.0), ("memory".to_string(), 4.0)]);
        let small = ResourceBundle::from_iter([("CPU".to_string(), 2.0), ("memory".to_string(), 2.0)]);
        let big = ResourceBundle::from_iter([("CPU".to_string(), 4.0), ("memory".to_string(), 8.0)]);

        assert!(!demand.fits_within(&small));
        assert!(demand.fits_within(&big));
    }

    #[test]
    fn subtract_from_clamps_at_zero() {
        let capacity = ResourceBundle::single("CPU", 2.0);
        let demand = ResourceBundle::single("CPU", 5.0);
        let remaining = demand.subtract_from(&capacity);
        assert_eq!(remaining.get("CPU"), 0.0);
    }

    #[test]
    fn delete_token_detection() {
        assert!(ResourceBundle::single("CPU", 0.0).is_delete_token());
        assert!(!ResourceBundle::single("CPU", 1.0).is_delete_token());
        let multi = ResourceBundle::from_iter([("CPU".to_string(), 0.0), ("GPU".to_string(), 0.0)]);
        assert!(!multi.is_delete_token());
    }

    #[test]
    fn richness_sums_all_resources() {
        let bundle = ResourceBundle::from_iter([("CPU".to_string(), 2.0), ("memory".to_string(), 8.0)]);
        assert_eq!(bundle.richness(), 10.0);
    }
}
