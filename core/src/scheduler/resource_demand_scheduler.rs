//! `ResourceDemandScheduler` (§4.4): bin-packs pending demands and standing
//! requests onto the node-type catalog, producing launch/terminate
//! decisions under per-type and global worker bounds.

use crate::config::model::ClusterConfig;
use crate::provider::NodeId;
use crate::resources::ResourceBundle;
use std::collections::BTreeMap;

/// One entry in the node-type catalog, in catalog declaration order (used
/// for tie-breaking, §4.4 step 6).
#[derive(Debug, Clone)]
pub struct NodeTypeCapacity {
    pub node_type: String,
    pub resources: ResourceBundle,
    pub min_workers: u32,
    pub max_workers: u32,
}

/// A currently-running node the scheduler must account for when computing
/// how many more of each type to launch.
#[derive(Debug, Clone)]
pub struct ExistingNode {
    pub node_id: NodeId,
    pub node_type: String,
    pub last_used_time: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulingDecision {
    pub to_launch: BTreeMap<String, u32>,
    pub to_terminate: Vec<NodeId>,
    /// Demand bundles that could not be placed on any catalog node type,
    /// reported in status rather than treated as an error (§4.4, §7).
    pub unschedulable: Vec<ResourceBundle>,
}

pub struct ResourceDemandScheduler {
    catalog: Vec<NodeTypeCapacity>,
    global_max_workers: u32,
}

impl ResourceDemandScheduler {
    pub fn from_config(config: &ClusterConfig) -> Self {
        let catalog = config
            .available_node_types
            .iter()
            .filter(|(name, _)| name.as_str() != config.head_node_type)
            .map(|(name, node_type)| NodeTypeCapacity {
                node_type: name.clone(),
                resources: node_type.resources.clone(),
                min_workers: node_type.min_workers,
                max_workers: node_type.max_workers,
            })
            .collect();
        Self {
            catalog,
            global_max_workers: config.global_max_workers(),
        }
    }

    pub fn new(catalog: Vec<NodeTypeCapacity>, global_max_workers: u32) -> Self {
        Self { catalog, global_max_workers }
    }

    /// First-fit-decreasing bin-packing (§4.4 step 3) of `standing_requests
    /// ++ pending_demands` onto residual capacity of `existing_nodes`, then
    /// onto fresh instances of the cheapest catalog entry that fits, in
    /// catalog declaration order on ties.
    pub fn schedule(
        &self,
        existing_nodes: &[ExistingNode],
        pending_demands: &[ResourceBundle],
        standing_requests: &[ResourceBundle],
        idle_timeout_secs: f64,
        now: f64,
    ) -> SchedulingDecision {
        let mut residual_by_node: BTreeMap<String, ResourceBundle> = existing_nodes
            .iter()
            .map(|node| {
                let capacity = self
                    .catalog
                    .iter()
                    .find(|c| c.node_type == node.node_type)
                    .map(|c| c.resources.clone())
                    .unwrap_or_default();
                (node.node_id.clone(), capacity)
            })
            .collect();

        let mut workload: Vec<&ResourceBundle> = standing_requests.iter().chain(pending_demands.iter()).collect();
        workload.sort_by(|a, b| b.richness().partial_cmp(&a.richness()).unwrap());

        let mut to_launch: BTreeMap<String, u32> = BTreeMap::new();
        let mut unschedulable = Vec::new();
        let mut pending_new_capacity: Vec<ResourceBundle> = Vec::new();

        for bundle in workload {
            if let Some(residual) = residual_by_node
                .values_mut()
                .find(|residual| bundle.fits_within(residual))
            {
                *residual = bundle.subtract_from(residual);
                continue;
            }

            if let Some(residual) = pending_new_capacity
                .iter_mut()
                .find(|residual| bundle.fits_within(residual))
            {
                *residual = bundle.subtract_from(residual);
                continue;
            }

            match self.cheapest_fit(bundle) {
                Some(node_type) => {
                    *to_launch.entry(node_type.node_type.clone()).or_insert(0) += 1;
                    pending_new_capacity.push(bundle.subtract_from(&node_type.resources));
                }
                None => unschedulable.push(bundle.clone()),
            }
        }

        self.apply_worker_bounds(&mut to_launch, existing_nodes);

        let to_terminate = self.idle_eviction_candidates(existing_nodes, idle_timeout_secs, now, &to_launch);

        SchedulingDecision {
            to_launch,
            to_terminate,
            unschedulable,
        }
    }

    /// Cheapest (lowest richness) catalog entry that can host `bundle`,
    /// ties broken by catalog declaration order.
    fn cheapest_fit(&self, bundle: &ResourceBundle) -> Option<&NodeTypeCapacity> {
        self.catalog
            .iter()
            .filter(|c| bundle.fits_within(&c.resources))
            .min_by(|a, b| a.resources.richness().partial_cmp(&b.resources.richness()).unwrap())
    }

    /// Enforces `min_workers <= target <= max_workers` per type and caps
    /// the cluster-wide sum at `global_max_workers` (§4.4 step 4). Targets
    /// are counts of *additional* launches on top of `existing_nodes`.
    fn apply_worker_bounds(&self, to_launch: &mut BTreeMap<String, u32>, existing_nodes: &[ExistingNode]) {
        let mut current_counts: BTreeMap<String, u32> = BTreeMap::new();
        for node in existing_nodes {
            *current_counts.entry(node.node_type.clone()).or_insert(0) += 1;
        }

        for node_type in &self.catalog {
            let current = *current_counts.get(&node_type.node_type).unwrap_or(&0);
            let requested = *to_launch.get(&node_type.node_type).unwrap_or(&0);
            let target_total = (current + requested).max(node_type.min_workers).min(node_type.max_workers);
            let additional = target_total.saturating_sub(current);
            if additional == 0 {
                to_launch.remove(&node_type.node_type);
            } else {
                to_launch.insert(node_type.node_type.clone(), additional);
            }
        }

        let current_total: u32 = current_counts.values().sum();
        let mut remaining_global_budget = self.global_max_workers.saturating_sub(current_total);
        for node_type in &self.catalog {
            let Some(count) = to_launch.get_mut(&node_type.node_type) else { continue };
            if *count > remaining_global_budget {
                *count = remaining_global_budget;
            }
            remaining_global_budget = remaining_global_budget.saturating_sub(*count);
            if *count == 0 {
                to_launch.remove(&node_type.node_type);
            }
        }
    }

    /// A node is a termination candidate iff it has been idle longer than
    /// `idle_timeout_secs` and removing it would not drop its type below
    /// `min_workers` (§4.4 step 5). Nodes whose type is about to receive new
    /// launches this tick are still eligible; launching and evicting the
    /// same type in one tick is a legitimate rebalance.
    fn idle_eviction_candidates(
        &self,
        existing_nodes: &[ExistingNode],
        idle_timeout_secs: f64,
        now: f64,
        to_launch: &BTreeMap<String, u32>,
    ) -> Vec<NodeId> {
        let mut counts: BTreeMap<String, u32> = BTreeMap::new();
        for node in existing_nodes {
            *counts.entry(node.node_type.clone()).or_insert(0) += 1;
        }
        for (node_type, added) in to_launch {
            *counts.entry(node_type.clone()).or_insert(0) += added;
        }

        let mut candidates = Vec::new();
        for node in existing_nodes {
            if now - node.last_used_time <= idle_timeout_secs {
                continue;
            }
            let min_workers = self
                .catalog
                .iter()
                .find(|c| c.node_type == node.node_type)
                .map(|c| c.min_workers)
                .unwrap_or(0);
            let count = counts.entry(node.node_type.clone()).or_insert(0);
            if *count > min_workers {
                candidates.push(node.node_id.clone());
                *count -= 1;
            }
        }
        candidates
    }
}
