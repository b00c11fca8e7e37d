//! `NodeUpdater` (§4.2): the per-node state machine that drives one
//! provisioned instance to `up-to-date`, idempotently, tolerating
//! cancellation at every suspension point.

use super::commands::{run_initialization_commands, run_setup_commands, run_start_commands, NodeCommandEnv};
use super::error::NodeUpdaterError;
use super::file_sync::sync_file_mounts;
use super::progress::{SetupProgress, SetupStep};
use super::ssh_wait::wait_for_ssh;
use crate::config::model::{CommandGroup, DockerConfig, FileMount};
use crate::event::cancellation::CancellationMessage;
use crate::event::channel::EventConsumer;
use crate::provider::{CommandExecutor, NodeId, NodeProvider, RsyncOptions};
use crate::resources::ResourceBundle;
use crate::tags;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Everything a `NodeUpdater` needs to know about the node it's bringing
/// up, gathered at construction time rather than re-read mid-run so one
/// Updater's view of its node is internally consistent for its whole
/// lifetime (§5: no Updater reads or writes another Updater's state).
pub struct NodeUpdaterSpec {
    pub node_id: NodeId,
    pub file_mounts: Vec<FileMount>,
    pub initialization_commands: Vec<CommandGroup>,
    pub setup_commands: Vec<CommandGroup>,
    pub start_commands: Vec<CommandGroup>,
    pub runtime_hash: String,
    pub file_mounts_contents_hash: Option<String>,
    pub is_head_node: bool,
    pub docker: Option<DockerConfig>,
    pub restart_only: bool,
    pub node_resources: Option<ResourceBundle>,
    pub rsync_options: RsyncOptions,
}

pub struct NodeUpdater<'a> {
    provider: &'a dyn NodeProvider,
    executor: Box<dyn CommandExecutor>,
    spec: NodeUpdaterSpec,
    command_env: NodeCommandEnv,
    retry_interval: Duration,
    cancel: EventConsumer<CancellationMessage>,
    progress: SetupProgress,
}

impl<'a> NodeUpdater<'a> {
    pub fn new(
        provider: &'a dyn NodeProvider,
        executor: Box<dyn CommandExecutor>,
        spec: NodeUpdaterSpec,
        command_env: NodeCommandEnv,
        retry_interval: Duration,
        cancel: EventConsumer<CancellationMessage>,
    ) -> Self {
        Self {
            provider,
            executor,
            spec,
            command_env,
            retry_interval,
            cancel,
            progress: SetupProgress::new(),
        }
    }

    /// Runs the full state machine to completion. On any error the node is
    /// tagged `update-failed` before the error is returned; on success it's
    /// tagged `up-to-date` with the fresh runtime/file-mounts hashes.
    #[instrument(skip(self), fields(node_id = %self.spec.node_id))]
    pub fn run(&mut self) -> Result<(), NodeUpdaterError> {
        match self.run_inner() {
            Ok(()) => {
                self.tag_success()?;
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "node update failed");
                self.tag_failure();
                Err(err)
            }
        }
    }

    fn run_inner(&mut self) -> Result<(), NodeUpdaterError> {
        // §4.2: when the node's runtime-config-hash (and file-mounts-hash,
        // if one is tracked) already matches, the whole of data-disk
        // bootstrap, file sync, and initialization is short-circuited,
        // independent of `restart_only` — a fully up-to-date node goes
        // straight to the start phase.
        let hash_match = self.hashes_match()?;

        self.set_status(tags::NodeStatus::WaitingForSsh)?;
        self.progress.advance(SetupStep::WaitingForSsh);
        wait_for_ssh(self.executor.as_ref(), &self.cancel)?;
        self.check_not_terminated()?;

        if hash_match {
            self.progress.advance(SetupStep::BootstrappingDataDisks);
        } else {
            self.set_status(tags::NodeStatus::BootstrappingDataDisks)?;
            self.progress.advance(SetupStep::BootstrappingDataDisks);
            self.executor.bootstrap_data_disks()?;
        }
        self.check_cancelled()?;

        if hash_match {
            self.progress.advance(SetupStep::SyncFileMounts);
        } else {
            self.set_status(tags::NodeStatus::SyncingFiles)?;
            self.progress.advance(SetupStep::SyncFileMounts);
            sync_file_mounts(self.executor.as_ref(), &self.spec.file_mounts, &self.spec.rsync_options)?;
        }
        self.check_cancelled()?;

        self.set_status(tags::NodeStatus::SettingUp)?;
        if hash_match {
            self.progress.advance(SetupStep::RunInitializationCommands);
        } else {
            self.run_initialization_phase()?;
        }
        let init_required = self.run_container_preflight()?;
        let skip_setup = hash_match && !init_required;
        self.run_setup_phase(skip_setup)?;
        self.run_start_phase()?;

        self.progress.advance(SetupStep::Done);
        Ok(())
    }

    fn run_initialization_phase(&mut self) -> Result<(), NodeUpdaterError> {
        self.progress.advance(SetupStep::RunInitializationCommands);
        run_initialization_commands(
            self.executor.as_ref(),
            &self.spec.initialization_commands,
            &self.command_env.for_initialization(),
            self.retry_interval,
        )
    }

    /// Preflight for the configured container runtime. Returns whether a
    /// full re-init is required even though the runtime hash matched
    /// (§4.2): the container is configured but not actually running.
    fn run_container_preflight(&mut self) -> Result<bool, NodeUpdaterError> {
        self.progress.advance(SetupStep::RunInit);
        let shared_memory_ratio = self.spec.docker.as_ref().map_or(0.0, |_| shared_memory_ratio());
        let file_mounts: BTreeMap<String, String> = self
            .spec
            .file_mounts
            .iter()
            .map(|m| (m.remote_path.clone(), m.local_path.clone()))
            .collect();
        let init_required = self.executor.run_init(
            self.spec.is_head_node,
            &file_mounts,
            shared_memory_ratio,
            self.spec.restart_only,
        )?;
        if init_required {
            warn!(node_id = %self.spec.node_id, "runtime hash matched but container was not running, forcing full setup");
        }
        Ok(init_required)
    }

    fn run_setup_phase(&mut self, skip: bool) -> Result<(), NodeUpdaterError> {
        self.progress.advance(SetupStep::RunSetupCommands);
        if skip {
            return Ok(());
        }
        run_setup_commands(
            self.executor.as_ref(),
            &self.spec.setup_commands,
            &self.command_env.for_setup(),
            self.retry_interval,
        )
    }

    fn run_start_phase(&mut self) -> Result<(), NodeUpdaterError> {
        self.progress.advance(SetupStep::RunStartCommands);
        let resources = self.spec.node_resources.clone().unwrap_or_default();
        run_start_commands(
            self.executor.as_ref(),
            &self.spec.start_commands,
            &self.command_env.for_start(&resources),
            self.retry_interval,
        )
    }

    fn hashes_match(&self) -> Result<bool, NodeUpdaterError> {
        let current_tags = self
            .provider
            .node_tags(&self.spec.node_id)
            .map_err(NodeUpdaterError::from)?;
        let runtime_matches = current_tags.get(tags::RUNTIME_CONFIG_HASH) == Some(&self.spec.runtime_hash);
        let file_mounts_match = match &self.spec.file_mounts_contents_hash {
            None => true,
            Some(expected) => current_tags.get(tags::FILE_MOUNTS_HASH) == Some(expected),
        };
        Ok(runtime_matches && file_mounts_match)
    }

    fn check_not_terminated(&self) -> Result<(), NodeUpdaterError> {
        if self.provider.is_terminated(&self.spec.node_id).map_err(NodeUpdaterError::from)? {
            return Err(NodeUpdaterError::NodeTerminated);
        }
        Ok(())
    }

    fn check_cancelled(&self) -> Result<(), NodeUpdaterError> {
        if self.cancel.is_cancelled(Duration::from_millis(0)) {
            return Err(NodeUpdaterError::Cancelled);
        }
        Ok(())
    }

    fn set_status(&self, status: tags::NodeStatus) -> Result<(), NodeUpdaterError> {
        info!(node_id = %self.spec.node_id, status = status.as_str(), "node status transition");
        let mut write = BTreeMap::new();
        write.insert(tags::NODE_STATUS.to_string(), status.to_string());
        self.provider
            .set_node_tags(&self.spec.node_id, write)
            .map_err(NodeUpdaterError::from)
    }

    fn tag_success(&self) -> Result<(), NodeUpdaterError> {
        let mut write = BTreeMap::new();
        write.insert(tags::NODE_STATUS.to_string(), crate::tags::NodeStatus::UpToDate.to_string());
        write.insert(tags::RUNTIME_CONFIG_HASH.to_string(), self.spec.runtime_hash.clone());
        if let Some(hash) = &self.spec.file_mounts_contents_hash {
            write.insert(tags::FILE_MOUNTS_HASH.to_string(), hash.clone());
        }
        if let Ok(current) = self.provider.node_tags(&self.spec.node_id) {
            if current.contains_key(tags::QUORUM_JOIN) {
                write.insert(
                    tags::QUORUM_JOIN.to_string(),
                    crate::tags::QuorumJoin::Success.as_str().to_string(),
                );
            }
        }
        self.provider
            .set_node_tags(&self.spec.node_id, write)
            .map_err(NodeUpdaterError::from)
    }

    fn tag_failure(&self) {
        let mut write = BTreeMap::new();
        write.insert(
            tags::NODE_STATUS.to_string(),
            crate::tags::NodeStatus::UpdateFailed.to_string(),
        );
        if let Ok(current) = self.provider.node_tags(&self.spec.node_id) {
            if current.contains_key(tags::QUORUM_JOIN) {
                write.insert(
                    tags::QUORUM_JOIN.to_string(),
                    crate::tags::QuorumJoin::Failed.as_str().to_string(),
                );
            }
        }
        // Best-effort: if the provider is unreachable at this point there is
        // nothing more this Updater can do; the controller will observe the
        // stale tag on its next tick and may retry.
        let _ = self.provider.set_node_tags(&self.spec.node_id, write);
    }
}

/// Fraction of total memory to offer the container as shared memory
/// (`/dev/shm`) when a docker runtime is configured (§4.2).
fn shared_memory_ratio() -> f64 {
    const SHARED_MEMORY_FRACTION: f64 = 0.3;
    const SHARED_MEMORY_RATIO_CAP: f64 = 0.8;
    SHARED_MEMORY_FRACTION.min(SHARED_MEMORY_RATIO_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::FileMount;
    use crate::provider::local_executor::LocalCommandExecutor;
    use crate::provider::static_provider::StaticNodeProvider;
    use crate::provider::NodeProvider;
    use std::collections::BTreeMap;

    fn command_env() -> NodeCommandEnv {
        NodeCommandEnv {
            node_type: "worker".to_string(),
            node_ip: "127.0.0.1".to_string(),
            head_ip: "127.0.0.1".to_string(),
            node_id: "node-1".to_string(),
            node_seq_id: "1".to_string(),
            provider_type: "onpremise".to_string(),
            runtime_version: "3.8".to_string(),
            workspace_name: "ws".to_string(),
            cluster_name: "cluster".to_string(),
            quorum_join: false,
        }
    }

    fn spec(node_id: NodeId) -> NodeUpdaterSpec {
        NodeUpdaterSpec {
            node_id,
            file_mounts: Vec::new(),
            initialization_commands: Vec::new(),
            setup_commands: vec![CommandGroup {
                group_name: "setup".to_string(),
                commands: vec!["true".to_string()],
            }],
            start_commands: vec![CommandGroup {
                group_name: "start".to_string(),
                commands: vec!["true".to_string()],
            }],
            runtime_hash: "hash-1".to_string(),
            file_mounts_contents_hash: None,
            is_head_node: true,
            docker: None,
            restart_only: false,
            node_resources: None,
            rsync_options: RsyncOptions::default(),
        }
    }

    #[test]
    fn fresh_node_reaches_up_to_date() {
        let provider = StaticNodeProvider::new();
        let ids = provider
            .create_nodes("head", &BTreeMap::new(), BTreeMap::new(), 1)
            .unwrap();
        let node_id = ids[0].clone();
        let executor = Box::new(LocalCommandExecutor::new());
        let (_publisher, cancel) = crate::event::channel::pub_sub();

        let mut updater = NodeUpdater::new(
            &provider,
            executor,
            spec(node_id.clone()),
            command_env(),
            Duration::from_millis(1),
            cancel,
        );
        let result = updater.run();
        assert!(result.is_ok());

        let final_tags = provider.node_tags(&node_id).unwrap();
        assert_eq!(
            final_tags.get(tags::NODE_STATUS).unwrap(),
            crate::tags::NodeStatus::UpToDate.as_str()
        );
        assert_eq!(final_tags.get(tags::RUNTIME_CONFIG_HASH).unwrap(), "hash-1");
    }

    #[test]
    fn failing_setup_command_marks_node_update_failed() {
        let provider = StaticNodeProvider::new();
        let ids = provider
            .create_nodes("worker", &BTreeMap::new(), BTreeMap::new(), 1)
            .unwrap();
        let node_id = ids[0].clone();
        let executor = Box::new(LocalCommandExecutor::new());
        let (_publisher, cancel) = crate::event::channel::pub_sub();

        let mut node_spec = spec(node_id.clone());
        node_spec.setup_commands = vec![CommandGroup {
            group_name: "setup".to_string(),
            commands: vec!["exit 1".to_string()],
        }];

        let mut updater = NodeUpdater::new(
            &provider,
            executor,
            node_spec,
            command_env(),
            Duration::from_millis(1),
            cancel,
        );
        let result = updater.run();
        assert!(result.is_err());

        let final_tags = provider.node_tags(&node_id).unwrap();
        assert_eq!(
            final_tags.get(tags::NODE_STATUS).unwrap(),
            crate::tags::NodeStatus::UpdateFailed.as_str()
        );
    }

    #[test]
    fn restart_only_with_matching_hash_skips_disks_and_sync() {
        let provider = StaticNodeProvider::new();
        let ids = provider
            .create_nodes("worker", &BTreeMap::new(), BTreeMap::new(), 1)
            .unwrap();
        let node_id = ids[0].clone();
        provider
            .set_node_tags(
                &node_id,
                BTreeMap::from([(tags::RUNTIME_CONFIG_HASH.to_string(), "hash-1".to_string())]),
            )
            .unwrap();
        let executor = Box::new(LocalCommandExecutor::new());
        let (_publisher, cancel) = crate::event::channel::pub_sub();

        let mut node_spec = spec(node_id.clone());
        node_spec.restart_only = true;
        node_spec.file_mounts = vec![FileMount {
            remote_path: "/remote/missing".to_string(),
            local_path: "/definitely/not/here".to_string(),
            allow_non_existing_paths: false,
        }];

        let mut updater = NodeUpdater::new(
            &provider,
            executor,
            node_spec,
            command_env(),
            Duration::from_millis(1),
            cancel,
        );
        // If sync were attempted this would fail on the missing required
        // mount; restart_only must skip it entirely.
        let result = updater.run();
        assert!(result.is_ok());
    }

    /// §4.2 idempotence: a node whose hashes already match skips data-disk
    /// bootstrap, file sync, and initialization/setup commands even when
    /// `restart_only` is false — the short-circuit is gated on the hash
    /// alone, not on `restart_only`.
    #[test]
    fn matching_hash_skips_disks_sync_and_init_regardless_of_restart_only() {
        use crate::provider::MockCommandExecutor;

        let provider = StaticNodeProvider::new();
        let ids = provider
            .create_nodes("worker", &BTreeMap::new(), BTreeMap::new(), 1)
            .unwrap();
        let node_id = ids[0].clone();
        provider
            .set_node_tags(
                &node_id,
                BTreeMap::from([(tags::RUNTIME_CONFIG_HASH.to_string(), "hash-1".to_string())]),
            )
            .unwrap();

        let mut executor = MockCommandExecutor::new();
        executor.expect_run().returning(|_, _, _, _| Ok(()));
        executor.expect_bootstrap_data_disks().times(0);
        executor.expect_run_rsync_up().times(0);
        executor.expect_run_init().returning(|_, _, _, _| Ok(false));
        executor
            .expect_run_with_retry()
            .withf(|cmd, _, _, _, _| cmd == "true")
            .returning(|_, _, _, _, _| Ok(()));

        let (_publisher, cancel) = crate::event::channel::pub_sub();
        let mut node_spec = spec(node_id.clone());
        node_spec.restart_only = false;

        let mut updater = NodeUpdater::new(
            &provider,
            Box::new(executor),
            node_spec,
            command_env(),
            Duration::from_millis(1),
            cancel,
        );
        let result = updater.run();
        assert!(result.is_ok());
    }
}
