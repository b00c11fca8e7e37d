//! `ClusterController` (§4.5): the single head-node loop tying together
//! provider polling, metrics, the scheduler, and per-node `NodeUpdater`s.
//! The loop itself is single-threaded cooperative (§5) — one call to
//! `tick` never overlaps another — while the Updaters it spawns run
//! concurrently in their own named threads.

use super::error::ControllerError;
use crate::config::model::ClusterConfig;
use crate::defaults::CONTROLLER_TICK_INTERVAL;
use crate::metrics::{ClusterMetrics, ResourceLoad, ScalingInstructions};
use crate::provider::{NodeId, NodeProvider};
use crate::resources::ResourceBundle;
use crate::scheduler::{ExistingNode, ResourceDemandScheduler, SchedulingDecision};
use crate::tags;
use crate::updater::{compute_file_mounts_contents_hash, compute_runtime_hash, NodeCommandEnv, NodeUpdater, NodeUpdaterSpec};
use crate::utils::thread_context::{NotStartedThreadContext, StartedThreadContext};
use fs::file::LocalFile;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, instrument, warn};

/// Published once per tick (§4.5 step 8) for external observation via the
/// status HTTP surface (§10.5).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScalingStatus {
    pub active_nodes: usize,
    pub to_launch: BTreeMap<String, u32>,
    pub to_terminate: Vec<NodeId>,
    pub unschedulable: Vec<ResourceBundle>,
}

pub struct ClusterController {
    provider: Arc<dyn NodeProvider>,
    config: ClusterConfig,
    metrics: ClusterMetrics,
    scheduler: ResourceDemandScheduler,
    updaters: BTreeMap<NodeId, StartedThreadContext>,
    retry_interval: Duration,
    last_status: ScalingStatus,
}

impl ClusterController {
    pub fn new(provider: Arc<dyn NodeProvider>, config: ClusterConfig) -> Self {
        let scheduler = ResourceDemandScheduler::from_config(&config);
        Self {
            provider,
            config,
            metrics: ClusterMetrics::new(),
            scheduler,
            updaters: BTreeMap::new(),
            retry_interval: Duration::from_secs(1),
            last_status: ScalingStatus::default(),
        }
    }

    pub fn metrics_mut(&mut self) -> &mut ClusterMetrics {
        &mut self.metrics
    }

    /// A heartbeat or resource update arriving from the provider's KV store
    /// (§4.5 step 3). The KV-store transport itself is an external
    /// collaborator in the same vein as `NodeProvider` and isn't specified
    /// further by this crate (see DESIGN.md); callers feed updates in here
    /// however they read them off that transport.
    pub fn ingest_heartbeat(&mut self, ip: &str, node_id: &NodeId, t: f64) {
        self.metrics.update_heartbeat(ip, node_id, t);
    }

    pub fn ingest_resources(
        &mut self,
        ip: &str,
        node_id: &NodeId,
        t: f64,
        static_resources: ResourceBundle,
        dynamic_resources: ResourceBundle,
        load: ResourceLoad,
    ) {
        self.metrics
            .update_node_resources(ip, node_id, t, static_resources, dynamic_resources, load);
    }

    pub fn ingest_scaling_instructions(&mut self, instructions: ScalingInstructions) {
        self.metrics.update_autoscaling_instructions(instructions);
    }

    pub fn tick_interval(&self) -> Duration {
        CONTROLLER_TICK_INTERVAL
    }

    /// The `ScalingStatus` published by the most recent `tick` (§10.5),
    /// for the status HTTP surface to poll without driving a tick itself.
    pub fn last_status(&self) -> &ScalingStatus {
        &self.last_status
    }

    /// Per-node status tags for every currently non-terminated node
    /// (§10.5), read straight from the provider rather than cached, so it
    /// reflects Updater writes that land between ticks.
    pub fn node_statuses(&self) -> Result<BTreeMap<NodeId, String>, ControllerError> {
        let mut statuses = BTreeMap::new();
        for node_id in self.provider.non_terminated_nodes(&BTreeMap::new())? {
            let tags = self.provider.node_tags(&node_id)?;
            if let Some(status) = tags.get(tags::NODE_STATUS) {
                statuses.insert(node_id, status.clone());
            }
        }
        Ok(statuses)
    }

    /// Runs one iteration of the control loop (§4.5 steps 1-8), using the
    /// current wall-clock time.
    pub fn tick(&mut self) -> Result<ScalingStatus, ControllerError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        self.tick_at(now)
    }

    #[instrument(skip(self), fields(cluster_name = %self.config.cluster_name))]
    pub fn tick_at(&mut self, now: f64) -> Result<ScalingStatus, ControllerError> {
        self.updaters.retain(|_, ctx| !ctx.is_finished());

        // Step 1: poll current inventory.
        let active_node_ids = match self.provider.non_terminated_nodes(&BTreeMap::new()) {
            Ok(ids) => ids,
            Err(err) if err.is_transient() => {
                warn!(error = %err, "provider poll failed transiently, skipping this tick");
                return Ok(self.last_status.clone());
            }
            Err(err) => return Err(err.into()),
        };

        // Step 2: prune metrics down to currently reported IPs.
        let mut active_ips = std::collections::HashSet::new();
        let mut existing_nodes = Vec::with_capacity(active_node_ids.len());
        for node_id in &active_node_ids {
            let tags = self.provider.node_tags(node_id)?;
            let node_type = tags.get(tags::NODE_TYPE).cloned().unwrap_or_default();
            if let Some(ip) = self.provider.internal_ip(node_id)? {
                active_ips.insert(ip.clone());
                let last_used_time = self.metrics.last_used_time(&ip).unwrap_or(now);
                existing_nodes.push(ExistingNode {
                    node_id: node_id.clone(),
                    node_type,
                    last_used_time,
                });
            }
        }
        self.metrics.prune_active_ips(&active_ips);

        // Step 3: heartbeat/resource ingestion happens out-of-band via
        // `ingest_*` before `tick_at` is called.

        // Step 4: ask the scheduler for a target node set.
        let idle_timeout_secs = (self.config.idle_timeout_minutes as f64) * 60.0;
        let demands = self.metrics.get_resource_demands(true);
        let requests = self.metrics.get_resource_requests();
        let decision: SchedulingDecision = self.scheduler.schedule(
            &existing_nodes,
            &demands,
            &requests,
            idle_timeout_secs,
            now,
        );

        // Step 5: terminate nodes the scheduler marked for eviction.
        for node_id in &decision.to_terminate {
            self.provider.terminate_node(node_id)?;
            if let Some(ctx) = self.updaters.remove(node_id) {
                let _ = ctx.stop();
            }
            info!(node_id, "terminated idle node");
        }

        // Step 6: launch new nodes per type.
        for (node_type, count) in &decision.to_launch {
            let mut tags_to_set = BTreeMap::new();
            tags_to_set.insert(tags::NODE_TYPE.to_string(), node_type.clone());
            tags_to_set.insert(
                tags::NODE_STATUS.to_string(),
                crate::tags::NodeStatus::WaitingForSsh.to_string(),
            );
            let node_config = self
                .config
                .available_node_types
                .get(node_type)
                .map(|nt| nt.node_config.clone())
                .unwrap_or_default();
            let launched = self
                .provider
                .create_nodes(node_type, &node_config, tags_to_set, *count)?;
            info!(node_type, count, ?launched, "launched new nodes");
        }

        // Step 7: ensure every not-yet-up-to-date node has a running Updater.
        for node_id in &active_node_ids {
            self.ensure_updater_running(node_id)?;
        }

        let status = ScalingStatus {
            active_nodes: active_node_ids.len(),
            to_launch: decision.to_launch,
            to_terminate: decision.to_terminate,
            unschedulable: decision.unschedulable,
        };
        self.last_status = status.clone();
        info!(summary = %self.metrics.info_string(), "tick complete");
        Ok(status)
    }

    fn ensure_updater_running(&mut self, node_id: &NodeId) -> Result<(), ControllerError> {
        if self.updaters.contains_key(node_id) {
            return Ok(());
        }
        let current_tags = self.provider.node_tags(node_id)?;
        let status = current_tags
            .get(tags::NODE_STATUS)
            .and_then(|s| s.parse::<crate::tags::NodeStatus>().ok());
        if matches!(status, Some(s) if s.is_terminal()) {
            return Ok(());
        }

        let provider = Arc::clone(&self.provider);
        let node_id_owned = node_id.clone();
        let spec = self.build_updater_spec(node_id, &current_tags);
        let command_env = self.build_command_env(node_id, &current_tags);
        let retry_interval = self.retry_interval;

        let thread_name = format!("updater-{node_id}");
        let context = NotStartedThreadContext::new(thread_name, move |cancel| {
            let Ok(executor) = provider.get_command_executor(&node_id_owned) else {
                return;
            };
            let provider_ref: &dyn NodeProvider = provider.as_ref();
            let mut updater = NodeUpdater::new(provider_ref, executor, spec, command_env, retry_interval, cancel);
            let _ = updater.run();
        })
        .start();

        self.updaters.insert(node_id.clone(), context);
        Ok(())
    }

    fn build_updater_spec(&self, node_id: &NodeId, current_tags: &BTreeMap<String, String>) -> NodeUpdaterSpec {
        let node_type_name = current_tags.get(tags::NODE_TYPE).cloned().unwrap_or_default();
        let node_resources = crate::provider::node_type_capacity(&self.config, &node_type_name);
        let docker = self
            .config
            .available_node_types
            .get(&node_type_name)
            .and_then(|nt| nt.docker.clone());

        NodeUpdaterSpec {
            node_id: node_id.clone(),
            file_mounts: self.config.file_mounts.clone(),
            initialization_commands: self.config.initialization_commands.clone(),
            setup_commands: self.config.setup_commands.clone(),
            start_commands: self.config.start_commands.clone(),
            runtime_hash: compute_runtime_hash(&self.config),
            file_mounts_contents_hash: compute_file_mounts_contents_hash(&self.config.file_mounts, &LocalFile),
            is_head_node: node_type_name == self.config.head_node_type,
            docker,
            restart_only: false,
            node_resources,
            rsync_options: crate::provider::RsyncOptions::default(),
        }
    }

    fn build_command_env(&self, node_id: &NodeId, current_tags: &BTreeMap<String, String>) -> NodeCommandEnv {
        NodeCommandEnv {
            node_type: current_tags.get(tags::NODE_TYPE).cloned().unwrap_or_default(),
            node_ip: self.provider.internal_ip(node_id).ok().flatten().unwrap_or_default(),
            head_ip: String::new(),
            node_id: node_id.clone(),
            node_seq_id: current_tags.get(tags::NODE_SEQ_ID).cloned().unwrap_or_default(),
            provider_type: self.provider.provider_type().to_string(),
            runtime_version: crate::defaults::DEFAULT_RUNTIME_VERSION.to_string(),
            workspace_name: String::new(),
            cluster_name: self.config.cluster_name.clone(),
            quorum_join: current_tags.contains_key(tags::QUORUM_JOIN),
        }
    }

    /// Stops every still-running Updater, waiting out whatever each is
    /// doing (§5: controller shutdown cancels all Updaters).
    pub fn shutdown(&mut self) {
        for (node_id, context) in std::mem::take(&mut self.updaters) {
            if let Err(err) = context.stop_blocking() {
                warn!(node_id, error = %err, "updater did not stop cleanly during shutdown");
            }
        }
    }
}
