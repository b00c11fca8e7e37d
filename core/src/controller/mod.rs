//! `ClusterController` (§4.5): the head-node tick loop tying together
//! provider polling, metrics, the scheduler, and per-node `NodeUpdater`s.

pub mod cluster_controller;
pub mod error;
pub mod runner;

pub use cluster_controller::{ClusterController, ScalingStatus};
pub use error::ControllerError;
pub use runner::{ControllerRunner, ControllerRunnerError};
