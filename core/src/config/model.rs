use crate::resources::ResourceBundle;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single ordered group of shell commands, e.g. the `setup_commands`
/// section of a node type. Kept as its own type (rather than a bare
/// `Vec<String>`) so the runtime hash (§4.2) can be computed uniformly
/// over initialization/setup/start groups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandGroup {
    pub group_name: String,
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub ssh_user: String,
    pub ssh_private_key: String,
    #[serde(default)]
    pub ssh_proxy_command: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(rename = "type")]
    pub provider_type: String,
    #[serde(default)]
    pub region: Option<String>,
    /// Provider-specific fields (subnet ids, security groups, project id,
    /// ...) that `bootstrap_config` fills in and that this core never
    /// interprets directly.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeTypeConfig {
    #[serde(default)]
    pub node_config: BTreeMap<String, serde_json::Value>,
    pub resources: ResourceBundle,
    #[serde(default)]
    pub min_workers: u32,
    #[serde(default = "default_max_workers")]
    pub max_workers: u32,
    #[serde(default)]
    pub docker: Option<DockerConfig>,
}

fn default_max_workers() -> u32 {
    u32::MAX
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DockerConfig {
    pub image: String,
    #[serde(default)]
    pub container_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMount {
    pub remote_path: String,
    pub local_path: String,
    #[serde(default)]
    pub allow_non_existing_paths: bool,
}

/// The validated declarative cluster description (§3). `bootstrapped`
/// and `config_hash` start unset and are filled in by `ConfigResolver`;
/// their presence is what makes step 1 of `bootstrap()` idempotent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub cluster_name: String,
    pub provider: ProviderConfig,
    pub auth: AuthConfig,
    pub available_node_types: BTreeMap<String, NodeTypeConfig>,
    pub head_node_type: String,
    #[serde(default)]
    pub file_mounts: Vec<FileMount>,
    #[serde(default)]
    pub initialization_commands: Vec<CommandGroup>,
    #[serde(default)]
    pub setup_commands: Vec<CommandGroup>,
    #[serde(default)]
    pub start_commands: Vec<CommandGroup>,
    #[serde(default)]
    pub runtime_config: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub idle_timeout_minutes: u32,
    #[serde(default)]
    pub max_workers: Option<u32>,

    #[serde(default)]
    pub bootstrapped: bool,
    #[serde(default)]
    pub config_hash: Option<String>,
}

impl ClusterConfig {
    pub fn head_node_type_config(&self) -> Option<&NodeTypeConfig> {
        self.available_node_types.get(&self.head_node_type)
    }

    pub fn global_max_workers(&self) -> u32 {
        self.max_workers.unwrap_or(u32::MAX)
    }
}
