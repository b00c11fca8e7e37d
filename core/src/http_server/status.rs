use crate::controller::ScalingStatus;
use serde::Serialize;
use std::collections::BTreeMap;

/// Cluster-wide scaling snapshot, refreshed after every controller tick
/// (§4.5 step 8, §10.5).
///
/// Example:
/// ```json
/// {
///   "active_nodes": 3,
///   "to_launch": {"worker-small": 2},
///   "to_terminate": ["node-4"],
///   "unschedulable_count": 0
/// }
/// ```
#[derive(Debug, Serialize, PartialEq, Default, Clone)]
pub(super) struct ScalingSnapshot {
    active_nodes: usize,
    to_launch: BTreeMap<String, u32>,
    to_terminate: Vec<String>,
    unschedulable_count: usize,
}

impl From<&ScalingStatus> for ScalingSnapshot {
    fn from(status: &ScalingStatus) -> Self {
        Self {
            active_nodes: status.active_nodes,
            to_launch: status.to_launch.clone(),
            to_terminate: status.to_terminate.clone(),
            unschedulable_count: status.unschedulable.len(),
        }
    }
}

/// Cluster health and scaling status. This information is shown when the
/// status endpoint is called.
///
/// Example:
/// ```json
/// {
///   "scaling": {
///     "active_nodes": 1,
///     "to_launch": {},
///     "to_terminate": [],
///     "unschedulable_count": 0
///   },
///   "nodes": {"node-1": "up-to-date"}
/// }
/// ```
#[derive(Debug, Serialize, PartialEq, Default, Clone)]
pub struct Status {
    pub(super) scaling: ScalingSnapshot,
    pub(super) nodes: BTreeMap<String, String>,
}

impl Status {
    pub fn update_scaling(&mut self, status: &ScalingStatus) {
        self.scaling = ScalingSnapshot::from(status);
    }

    /// Replaces the node-status table wholesale, since it is always read
    /// fresh from the provider rather than updated incrementally (§10.5).
    pub fn replace_nodes(&mut self, nodes: BTreeMap<String, String>) {
        self.nodes = nodes;
    }
}
