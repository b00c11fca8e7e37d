//! External capability seams the core consumes but never implements (§1, §6):
//! `NodeProvider` abstracts cloud CRUD on instances/tags/IPs, `CommandExecutor`
//! abstracts running shell commands and rsync against one node. Every cloud
//! adapter (AWS/GCP/Azure/Aliyun/Kubernetes/on-premise) is out of scope; this
//! crate only defines the trait boundary and ships a static/local reference
//! implementation for tests and single-box on-premise operation.

pub mod local_executor;
pub mod static_provider;

use crate::config::model::ClusterConfig;
use crate::resources::ResourceBundle;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

pub type NodeId = String;

/// Whether a `ProviderError` should be retried on the controller's next tick
/// (§7) or propagated as fatal.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transient provider error: {0}")]
    Transient(String),
    #[error("permanent provider error: {0}")]
    Permanent(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// Where a command executes relative to a configured docker runtime: `Host`
/// always runs outside the container (initialization commands); `Auto` runs
/// inside the container when one is configured, on the host otherwise
/// (setup/start commands).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnv {
    Host,
    Auto,
}

/// Options accepted by `run_rsync_up`/`run_rsync_down` (§6).
#[derive(Debug, Clone, Default)]
pub struct RsyncOptions {
    pub docker_mount_if_possible: bool,
    pub rsync_exclude: Vec<String>,
    pub rsync_filter: Vec<String>,
}

/// A single shell command executed on a node. `CommandFailed` carries enough
/// structure to satisfy the S6 testable property without parsing `Display`
/// output: the failing command string, its exit code, and an optional
/// classification tag mirroring the source's `msg_type` used to steer retry
/// control flow.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command `{cmd}` failed with exit code {exit_code:?}{}", msg_type.as_ref().map(|m| format!(" ({m})")).unwrap_or_default())]
    CommandFailed {
        cmd: String,
        exit_code: Option<i32>,
        msg_type: Option<String>,
    },
    #[error("command timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection refused")]
    ConnectionRefused,
    #[error("ssh transport error: {0}")]
    Transport(String),
}

impl CommandError {
    pub fn is_connection_refused(&self) -> bool {
        matches!(self, CommandError::ConnectionRefused)
    }

    pub fn is_ssh_command_failed(&self) -> bool {
        matches!(self, CommandError::CommandFailed { .. })
    }
}

/// Per-node command execution handle (§6). Produced by `NodeProvider::get_command_executor`
/// so it can be bound to one SSH session / one container wrapper without a
/// back-reference to the provider that created it (§9, cyclic references).
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
pub trait CommandExecutor: Send {
    fn run(
        &self,
        cmd: &str,
        env: &BTreeMap<String, String>,
        timeout: Option<Duration>,
        run_env: RunEnv,
    ) -> Result<(), CommandError>;

    fn run_with_retry(
        &self,
        cmd: &str,
        env: &BTreeMap<String, String>,
        run_env: RunEnv,
        number_of_retries: u32,
        retry_interval: Duration,
    ) -> Result<(), CommandError>;

    fn run_rsync_up(&self, src: &str, dst: &str, options: &RsyncOptions) -> Result<(), CommandError>;

    fn run_rsync_down(&self, src: &str, dst: &str, options: &RsyncOptions) -> Result<(), CommandError>;

    /// Preflight before setup: ensures the docker container (if configured)
    /// is running. Returns `true` iff a full re-init is required even though
    /// the runtime hash matched (§4.2 idempotence / skip logic).
    fn run_init(
        &self,
        as_head: bool,
        file_mounts: &BTreeMap<String, String>,
        shared_memory_ratio: f64,
        sync_run_yet: bool,
    ) -> Result<bool, CommandError>;

    fn bootstrap_data_disks(&self) -> Result<(), CommandError>;
}

/// Cloud CRUD on instances, tags and IPs (§6). One `NodeProvider` is shared
/// across the whole `ClusterController`; `get_command_executor` mints a
/// fresh `CommandExecutor` per node on demand.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
pub trait NodeProvider: Send + Sync {
    fn non_terminated_nodes(&self, tag_filters: &BTreeMap<String, String>) -> Result<Vec<NodeId>, ProviderError>;

    fn is_terminated(&self, node_id: &NodeId) -> Result<bool, ProviderError>;

    fn node_tags(&self, node_id: &NodeId) -> Result<BTreeMap<String, String>, ProviderError>;

    fn set_node_tags(&self, node_id: &NodeId, tags: BTreeMap<String, String>) -> Result<(), ProviderError>;

    fn internal_ip(&self, node_id: &NodeId) -> Result<Option<String>, ProviderError>;

    fn external_ip(&self, node_id: &NodeId) -> Result<Option<String>, ProviderError>;

    fn create_nodes(
        &self,
        node_type: &str,
        node_config: &BTreeMap<String, Value>,
        tags: BTreeMap<String, String>,
        count: u32,
    ) -> Result<Vec<NodeId>, ProviderError>;

    fn terminate_node(&self, node_id: &NodeId) -> Result<(), ProviderError>;

    fn get_command_executor(&self, node_id: &NodeId) -> Result<Box<dyn CommandExecutor>, ProviderError>;

    fn post_prepare(&self, config: ClusterConfig) -> Result<ClusterConfig, ProviderError>;

    fn bootstrap_config(&self, config: ClusterConfig) -> Result<ClusterConfig, ProviderError>;

    /// Provider-specific type string (e.g. `aws`, `onpremise`), used to
    /// decide whether start commands receive the `CLOUDTIK_RESOURCES`
    /// override (§4.2).
    fn provider_type(&self) -> &str;
}

/// Resolves a provider type string to a capacity for the given cluster
/// resources (§4.1 step 5: "look up a provider factory by `provider.type`").
/// The registry is populated at startup; unknown types are rejected with
/// `ConfigError::UnsupportedProvider` by the caller.
pub trait NodeProviderFactory: Send + Sync {
    fn provider_type(&self) -> &'static str;
    fn create(&self, cluster_name: &str) -> Box<dyn NodeProvider>;
}

/// Starting point for bin-packing: the static resource bundle a node type
/// advertises, read from the node-type catalog rather than the provider.
pub fn node_type_capacity(config: &ClusterConfig, node_type: &str) -> Option<ResourceBundle> {
    config
        .available_node_types
        .get(node_type)
        .map(|nt| nt.resources.clone())
}
