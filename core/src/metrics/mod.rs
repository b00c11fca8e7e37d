//! `ClusterMetrics` (§4.3): per-IP liveness/capacity store feeding the
//! scheduler and the status HTTP surface.

pub mod cluster_metrics;
pub mod freq;

pub use cluster_metrics::{ClusterMetrics, ClusterMetricsSummary, ResourceLoad, ScalingInstructions};
pub use freq::freq_of_dicts;
