//! `ResourceDemandScheduler` (§4.4): bin-packs demands onto the node-type
//! catalog and decides which idle nodes are safe to terminate.

pub mod resource_demand_scheduler;

pub use resource_demand_scheduler::{
    ExistingNode, NodeTypeCapacity, ResourceDemandScheduler, SchedulingDecision,
};
