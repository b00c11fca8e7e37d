//! `ClusterMetrics` (§4.3): time-indexed, IP-keyed store of per-node
//! liveness and capacity data, plus cluster-wide pending demands and
//! standing resource requests. Accessed only from the controller thread
//! (§5); Updaters never touch it directly.

use super::freq::freq_of_dicts;
use crate::defaults::{CLOUDTIK_MAX_RESOURCE_DEMAND_VECTOR_SIZE, CLOUDTIK_MEMORY_RESOURCE_UNIT_BYTES};
use crate::provider::NodeId;
use crate::resources::ResourceBundle;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

const IDLE_TOLERANCE: f64 = 1e-6;

/// Per-resource saturation plus the coarse `in_use` flag a node reports
/// alongside its resource snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceLoad {
    pub saturation: ResourceBundle,
    pub in_use: bool,
}

/// A scaling-policy publication consumed by `update_autoscaling_instructions`.
#[derive(Debug, Clone, Default)]
pub struct ScalingInstructions {
    pub scaling_time: f64,
    pub resource_demands: Vec<ResourceBundle>,
    pub resource_requests: Vec<ResourceBundle>,
}

/// `usage: {resource -> (used, total)}` plus frequency-counted demand,
/// request, and node-type tables (§4.3).
#[derive(Debug, Clone, Default)]
pub struct ClusterMetricsSummary {
    pub usage: HashMap<String, (f64, f64)>,
    pub resource_demand: Vec<(ResourceBundle, usize)>,
    pub request_demand: Vec<(ResourceBundle, usize)>,
    pub node_types: Vec<(ResourceBundle, usize)>,
}

#[derive(Debug, Default)]
pub struct ClusterMetrics {
    node_id_by_ip: HashMap<String, NodeId>,
    last_heartbeat_time_by_ip: HashMap<String, f64>,
    last_resource_time_by_ip: HashMap<String, f64>,
    last_used_time_by_ip: HashMap<String, f64>,
    static_resources_by_ip: HashMap<String, ResourceBundle>,
    dynamic_resources_by_ip: HashMap<String, ResourceBundle>,
    resource_load_by_ip: HashMap<String, ResourceLoad>,
    active_ips: HashSet<String>,

    last_demanding_time: f64,
    resource_demands: Vec<ResourceBundle>,
    last_requesting_time: f64,
    resource_requests: Vec<ResourceBundle>,
}

impl ClusterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a heartbeat. Rejects (no-ops, with a debug log) a heartbeat
    /// whose `t` is strictly older than the stored one, per the guarded
    /// decision recorded in DESIGN.md: the source leaves this unchecked and
    /// lets a stale heartbeat overwrite a fresh one.
    pub fn update_heartbeat(&mut self, ip: &str, node_id: &NodeId, t: f64) -> bool {
        if let Some(&last) = self.last_heartbeat_time_by_ip.get(ip) {
            if t < last {
                debug!(ip, t, last, "rejecting out-of-order heartbeat");
                return false;
            }
        }
        self.node_id_by_ip.insert(ip.to_string(), node_id.clone());
        self.last_heartbeat_time_by_ip.insert(ip.to_string(), t);
        self.mark_active(ip);
        true
    }

    /// Records a resource snapshot. Missing keys in `dynamic` (present in
    /// `static` but absent from the reported `dynamic`) default to zero
    /// rather than to the static value, since an unreported resource should
    /// read as unavailable, not as fully free.
    pub fn update_node_resources(
        &mut self,
        ip: &str,
        node_id: &NodeId,
        t: f64,
        static_resources: ResourceBundle,
        mut dynamic_resources: ResourceBundle,
        load: ResourceLoad,
    ) -> bool {
        if let Some(&last) = self.last_resource_time_by_ip.get(ip) {
            if t < last {
                debug!(ip, t, last, "rejecting out-of-order resource update");
                return false;
            }
        }

        for resource in static_resources.resource_ids() {
            if !dynamic_resources.contains(resource) {
                dynamic_resources.set(resource, 0.0);
            }
        }

        let is_new = !self.static_resources_by_ip.contains_key(ip);
        let in_use = load.in_use;

        self.node_id_by_ip.insert(ip.to_string(), node_id.clone());
        self.static_resources_by_ip.insert(ip.to_string(), static_resources.clone());
        self.dynamic_resources_by_ip.insert(ip.to_string(), dynamic_resources.clone());
        self.resource_load_by_ip.insert(ip.to_string(), load.clone());
        self.last_resource_time_by_ip.insert(ip.to_string(), t);

        let idle = is_node_idle(&static_resources, &dynamic_resources, &load);
        if is_new || in_use || !idle {
            self.last_used_time_by_ip.insert(ip.to_string(), t);
        }
        self.mark_active(ip);
        true
    }

    /// Merges a scaling-policy publication. Demands are replaced wholesale
    /// only when `scaling_time` advances; requests are merged via
    /// `set_resource_requests`. Returns `true` iff the standing requests
    /// actually changed.
    pub fn update_autoscaling_instructions(&mut self, instructions: ScalingInstructions) -> bool {
        if instructions.scaling_time > self.last_demanding_time {
            self.last_demanding_time = instructions.scaling_time;
            self.resource_demands = instructions.resource_demands;
        }
        self.set_resource_requests(instructions.scaling_time, instructions.resource_requests, false)
    }

    /// Merges `requests` into the standing set. Rejects stale `t`. A
    /// single-key zero-valued bundle is a delete token (dropped, and
    /// removes any existing request touching that resource). Unless
    /// `override_existing`, any existing request touching a resource-id
    /// present in `requests` is dropped before the filtered new set is
    /// appended.
    pub fn set_resource_requests(&mut self, t: f64, requests: Vec<ResourceBundle>, override_existing: bool) -> bool {
        if t <= self.last_requesting_time {
            debug!(t, last = self.last_requesting_time, "rejecting stale resource request update");
            return false;
        }
        self.last_requesting_time = t;

        let touched: HashSet<String> = requests
            .iter()
            .flat_map(|b| b.resource_ids().map(|s| s.to_string()))
            .collect();

        let surviving: Vec<ResourceBundle> = if override_existing {
            Vec::new()
        } else {
            self.resource_requests
                .iter()
                .filter(|existing| !existing.resource_ids().any(|r| touched.contains(r)))
                .cloned()
                .collect()
        };

        let incoming: Vec<ResourceBundle> = requests.into_iter().filter(|b| !b.is_delete_token()).collect();

        let before = self.resource_requests.clone();
        self.resource_requests = surviving.into_iter().chain(incoming).collect();
        before != self.resource_requests
    }

    /// Convenience wrapper around the `{r:0}` delete-sentinel convention
    /// (§9 Open Questions): drops every standing request touching `r`
    /// without callers needing to know the sentinel encoding.
    pub fn drop_requests_for_resource(&mut self, t: f64, resource: &str) -> bool {
        self.set_resource_requests(t, vec![ResourceBundle::single(resource, 0.0)], false)
    }

    /// Drops every inner-map entry whose IP is not in `active`.
    pub fn prune_active_ips(&mut self, active: &HashSet<String>) {
        for ip in self
            .last_used_time_by_ip
            .keys()
            .filter(|ip| !active.contains(*ip))
            .cloned()
            .collect::<Vec<_>>()
        {
            info!(ip, "pruning metrics for node no longer reported by provider");
        }
        self.node_id_by_ip.retain(|ip, _| active.contains(ip));
        self.last_heartbeat_time_by_ip.retain(|ip, _| active.contains(ip));
        self.last_resource_time_by_ip.retain(|ip, _| active.contains(ip));
        self.last_used_time_by_ip.retain(|ip, _| active.contains(ip));
        self.static_resources_by_ip.retain(|ip, _| active.contains(ip));
        self.dynamic_resources_by_ip.retain(|ip, _| active.contains(ip));
        self.resource_load_by_ip.retain(|ip, _| active.contains(ip));
        self.active_ips.retain(|ip| active.contains(ip));
    }

    pub fn summary(&self) -> ClusterMetricsSummary {
        let mut usage: HashMap<String, (f64, f64)> = HashMap::new();
        for (ip, static_resources) in &self.static_resources_by_ip {
            let dynamic = self.dynamic_resources_by_ip.get(ip);
            for resource in static_resources.resource_ids() {
                let total = static_resources.get(resource);
                let available = dynamic.map(|d| d.get(resource)).unwrap_or(0.0);
                let used = (total - available).max(0.0);
                let scale = if resource == "memory" { CLOUDTIK_MEMORY_RESOURCE_UNIT_BYTES } else { 1.0 };
                let entry = usage.entry(resource.to_string()).or_insert((0.0, 0.0));
                entry.0 += used / scale;
                entry.1 += total / scale;
            }
        }

        ClusterMetricsSummary {
            usage,
            resource_demand: freq_of_dicts(&self.resource_demands),
            request_demand: freq_of_dicts(&self.resource_requests),
            node_types: freq_of_dicts(&self.static_resources_by_ip.values().cloned().collect::<Vec<_>>()),
        }
    }

    /// Pending demands, truncated at `CLOUDTIK_MAX_RESOURCE_DEMAND_VECTOR_SIZE`
    /// when `clip` is set, to bound the scheduler's bin-packing time.
    pub fn get_resource_demands(&self, clip: bool) -> Vec<ResourceBundle> {
        if clip && self.resource_demands.len() > CLOUDTIK_MAX_RESOURCE_DEMAND_VECTOR_SIZE {
            self.resource_demands[..CLOUDTIK_MAX_RESOURCE_DEMAND_VECTOR_SIZE].to_vec()
        } else {
            self.resource_demands.clone()
        }
    }

    /// Standing resource requests (§4.4 step 2: concatenated with pending
    /// demands to build the scheduler's packing workload).
    pub fn get_resource_requests(&self) -> Vec<ResourceBundle> {
        self.resource_requests.clone()
    }

    pub fn get_node_resources(&self, ip: &str) -> Option<(ResourceBundle, ResourceBundle, ResourceLoad)> {
        let static_resources = self.static_resources_by_ip.get(ip)?.clone();
        let dynamic_resources = self.dynamic_resources_by_ip.get(ip).cloned().unwrap_or_default();
        let load = self.resource_load_by_ip.get(ip).cloned().unwrap_or_default();
        Some((static_resources, dynamic_resources, load))
    }

    pub fn get_static_node_resources_by_ip(&self) -> HashMap<String, ResourceBundle> {
        self.static_resources_by_ip.clone()
    }

    /// When this IP was last seen doing real work, for the scheduler's idle
    /// eviction check. `None` for an IP with no resource report yet.
    pub fn last_used_time(&self, ip: &str) -> Option<f64> {
        self.last_used_time_by_ip.get(ip).copied()
    }

    pub fn get_resource_utilization(&self) -> HashMap<String, (f64, f64)> {
        self.summary().usage
    }

    pub fn resources_avail_summary(&self) -> String {
        let mut entries: Vec<(String, f64, f64)> = self
            .get_resource_utilization()
            .into_iter()
            .map(|(resource, (used, total))| (resource, used, total))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
            .into_iter()
            .map(|(resource, used, total)| format!("{resource}: {:.1}/{:.1}", total - used, total))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn mark_active(&mut self, ip: &str) {
        self.active_ips.insert(ip.to_string());
    }

    pub fn is_active(&self, ip: &str) -> bool {
        self.active_ips.contains(ip)
    }

    pub fn info_string(&self) -> String {
        format!(
            "{} active node(s), {} pending demand(s), {} standing request(s) -- {}",
            self.active_ips.len(),
            self.resource_demands.len(),
            self.resource_requests.len(),
            self.resources_avail_summary()
        )
    }
}

/// A node is idle iff every resource reads fully available (within a
/// small relative tolerance) and `load.in_use` is falsy. Implements the
/// commented-out intent in the source rather than its hardcoded-`true`
/// fallback (§9 Open Questions / DESIGN.md).
fn is_node_idle(static_resources: &ResourceBundle, dynamic_resources: &ResourceBundle, load: &ResourceLoad) -> bool {
    if load.in_use {
        return false;
    }
    static_resources
        .resource_ids()
        .all(|r| (static_resources.get(r) - dynamic_resources.get(r)).abs() <= IDLE_TOLERANCE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_heartbeat_is_rejected() {
        let mut metrics = ClusterMetrics::new();
        assert!(metrics.update_heartbeat("10.0.0.1", &"node-1".to_string(), 10.0));
        assert!(!metrics.update_heartbeat("10.0.0.1", &"node-1".to_string(), 5.0));
        assert_eq!(metrics.last_heartbeat_time_by_ip["10.0.0.1"], 10.0);
    }

    #[test]
    fn dynamic_never_exceeds_static_after_update() {
        let mut metrics = ClusterMetrics::new();
        let static_resources = ResourceBundle::from_iter([("CPU".to_string(), 4.0)]);
        let dynamic_resources = ResourceBundle::from_iter([("CPU".to_string(), 8.0)]);
        metrics.update_node_resources(
            "10.0.0.1",
            &"node-1".to_string(),
            1.0,
            static_resources,
            dynamic_resources,
            ResourceLoad::default(),
        );
        let (static_r, dynamic_r, _) = metrics.get_node_resources("10.0.0.1").unwrap();
        // The store itself does not clamp; this asserts the scheduler-facing
        // accessor surfaces exactly what was reported so callers can detect
        // an inconsistent provider rather than have it silently clamped.
        assert_eq!(dynamic_r.get("CPU"), 8.0);
        assert_eq!(static_r.get("CPU"), 4.0);
    }

    #[test]
    fn prune_active_ips_drops_everything_else() {
        let mut metrics = ClusterMetrics::new();
        metrics.update_heartbeat("10.0.0.1", &"node-1".to_string(), 1.0);
        metrics.update_heartbeat("10.0.0.2", &"node-2".to_string(), 1.0);

        let mut active = HashSet::new();
        active.insert("10.0.0.1".to_string());
        metrics.prune_active_ips(&active);

        assert!(metrics.is_active("10.0.0.1"));
        assert!(!metrics.is_active("10.0.0.2"));
    }

    #[test]
    fn request_merge_replaces_touched_resources_only() {
        let mut metrics = ClusterMetrics::new();
        metrics.set_resource_requests(
            1.0,
            vec![ResourceBundle::from_iter([("CPU".to_string(), 2.0), ("GPU".to_string(), 1.0)])],
            false,
        );
        metrics.set_resource_requests(2.0, vec![ResourceBundle::single("CPU", 4.0)], false);

        let summary = metrics.summary();
        let total_cpu: f64 = summary
            .request_demand
            .iter()
            .map(|(bundle, count)| bundle.get("CPU") * *count as f64)
            .sum();
        assert_eq!(total_cpu, 4.0);
    }

    #[test]
    fn delete_token_drops_matching_requests_without_persisting() {
        let mut metrics = ClusterMetrics::new();
        metrics.set_resource_requests(1.0, vec![ResourceBundle::single("GPU", 2.0)], false);
        metrics.drop_requests_for_resource(2.0, "GPU");

        let summary = metrics.summary();
        assert!(summary.request_demand.is_empty());
    }

    #[test]
    fn stale_request_update_is_rejected() {
        let mut metrics = ClusterMetrics::new();
        metrics.set_resource_requests(5.0, vec![ResourceBundle::single("CPU", 1.0)], false);
        assert!(!metrics.set_resource_requests(3.0, vec![ResourceBundle::single("CPU", 2.0)], false));
    }

    #[test]
    fn idle_node_does_not_advance_last_used_time_again() {
        let mut metrics = ClusterMetrics::new();
        let static_resources = ResourceBundle::single("CPU", 4.0);
        metrics.update_node_resources(
            "10.0.0.1",
            &"node-1".to_string(),
            1.0,
            static_resources.clone(),
            static_resources.clone(),
            ResourceLoad::default(),
        );
        metrics.update_node_resources(
            "10.0.0.1",
            &"node-1".to_string(),
            2.0,
            static_resources.clone(),
            static_resources,
            ResourceLoad::default(),
        );
        // First update is always "new", the second is idle (dynamic==static,
        // not in_use) and must not bump last_used_time again.
        assert_eq!(metrics.last_used_time_by_ip["10.0.0.1"], 1.0);
    }
}
