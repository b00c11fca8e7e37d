//! CloudTik cluster launcher and lifecycle control plane: the per-node
//! `Updater` state machine (§4.2) and the head-node `ClusterMetrics` +
//! `ResourceDemandScheduler` + `ClusterController` subsystem (§4.3-4.5)
//! that together bring up and continuously autoscale a cluster. Every
//! cloud-specific adapter is out of scope (§1); this crate owns the
//! control-plane logic and the trait boundary cloud adapters implement.

pub mod config;
pub mod controller;
pub mod defaults;
pub mod event;
pub mod http_server;
pub mod metrics;
pub mod provider;
pub mod resources;
pub mod scheduler;
pub mod tags;
pub mod updater;
pub mod utils;
