//! Command-group execution (§4.2, §6): runs the three ordered command-group
//! lists with per-phase retry counts and environment blocks.

use super::error::NodeUpdaterError;
use crate::config::model::CommandGroup;
use crate::defaults::{
    env_vars, INITIALIZATION_COMMAND_DEFAULT_NUMBER_OF_RETRIES, RESOURCES_OVERRIDE_EXEMPT_PROVIDERS,
    SETUP_COMMAND_DEFAULT_NUMBER_OF_RETRIES, START_COMMAND_DEFAULT_NUMBER_OF_RETRIES,
};
use crate::provider::{CommandExecutor, RunEnv};
use crate::resources::ResourceBundle;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

/// Environment shared by every command run against a node (§6), plus the
/// resource-bundle override for start commands. `provider_type` decides
/// whether `CLOUDTIK_RESOURCES` is withheld (on-premise nodes report their
/// own hardware and must not be told a bundle that may not match it).
pub struct NodeCommandEnv {
    pub node_type: String,
    pub node_ip: String,
    pub head_ip: String,
    pub node_id: String,
    pub node_seq_id: String,
    pub provider_type: String,
    pub runtime_version: String,
    pub workspace_name: String,
    pub cluster_name: String,
    pub quorum_join: bool,
}

impl NodeCommandEnv {
    fn base_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert(env_vars::NODE_TYPE.to_string(), self.node_type.clone());
        env.insert(env_vars::NODE_IP.to_string(), self.node_ip.clone());
        env.insert(env_vars::HEAD_IP.to_string(), self.head_ip.clone());
        env.insert(env_vars::NODE_ID.to_string(), self.node_id.clone());
        env.insert(env_vars::NODE_SEQ_ID.to_string(), self.node_seq_id.clone());
        env.insert(env_vars::PROVIDER_TYPE.to_string(), self.provider_type.clone());
        env.insert(env_vars::RUNTIME_VERSION.to_string(), self.runtime_version.clone());
        env.insert(env_vars::WORKSPACE_NAME.to_string(), self.workspace_name.clone());
        env.insert(env_vars::CLUSTER_NAME.to_string(), self.cluster_name.clone());
        env.insert(
            env_vars::QUORUM_JOIN.to_string(),
            self.quorum_join.to_string(),
        );
        env
    }

    /// Environment for initialization commands: no resource override, these
    /// run before the node has reported any capacity.
    pub fn for_initialization(&self) -> BTreeMap<String, String> {
        self.base_env()
    }

    /// Environment for setup commands: same as initialization, the resource
    /// override is only injected for start commands per §4.2.
    pub fn for_setup(&self) -> BTreeMap<String, String> {
        self.base_env()
    }

    /// Environment for start commands: includes `CLOUDTIK_RESOURCES` unless
    /// the provider type is resource-override exempt.
    pub fn for_start(&self, resources: &ResourceBundle) -> BTreeMap<String, String> {
        let mut env = self.base_env();
        if !RESOURCES_OVERRIDE_EXEMPT_PROVIDERS.contains(&self.provider_type.as_str()) {
            if let Ok(serialized) = serde_json::to_string(resources) {
                env.insert(env_vars::RESOURCES.to_string(), serialized);
            }
        }
        env
    }
}

fn run_groups(
    executor: &dyn CommandExecutor,
    groups: &[CommandGroup],
    env: &BTreeMap<String, String>,
    run_env: RunEnv,
    number_of_retries: u32,
    retry_interval: Duration,
) -> Result<(), NodeUpdaterError> {
    for group in groups {
        for cmd in &group.commands {
            info!(group = %group.group_name, cmd, "running command");
            executor.run_with_retry(cmd, env, run_env, number_of_retries, retry_interval)?;
        }
    }
    Ok(())
}

/// Initialization commands run on the host, outside any docker container,
/// with up to `INITIALIZATION_COMMAND_DEFAULT_NUMBER_OF_RETRIES` retries.
pub fn run_initialization_commands(
    executor: &dyn CommandExecutor,
    groups: &[CommandGroup],
    env: &BTreeMap<String, String>,
    retry_interval: Duration,
) -> Result<(), NodeUpdaterError> {
    run_groups(
        executor,
        groups,
        env,
        RunEnv::Host,
        INITIALIZATION_COMMAND_DEFAULT_NUMBER_OF_RETRIES,
        retry_interval,
    )
}

/// Setup commands run inside the container when docker is configured
/// (`RunEnv::Auto`), with up to `SETUP_COMMAND_DEFAULT_NUMBER_OF_RETRIES`
/// retries.
pub fn run_setup_commands(
    executor: &dyn CommandExecutor,
    groups: &[CommandGroup],
    env: &BTreeMap<String, String>,
    retry_interval: Duration,
) -> Result<(), NodeUpdaterError> {
    run_groups(
        executor,
        groups,
        env,
        RunEnv::Auto,
        SETUP_COMMAND_DEFAULT_NUMBER_OF_RETRIES,
        retry_interval,
    )
}

/// Start commands run inside the container when docker is configured, with
/// up to `START_COMMAND_DEFAULT_NUMBER_OF_RETRIES` retries.
pub fn run_start_commands(
    executor: &dyn CommandExecutor,
    groups: &[CommandGroup],
    env: &BTreeMap<String, String>,
    retry_interval: Duration,
) -> Result<(), NodeUpdaterError> {
    run_groups(
        executor,
        groups,
        env,
        RunEnv::Auto,
        START_COMMAND_DEFAULT_NUMBER_OF_RETRIES,
        retry_interval,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockCommandExecutor;

    fn env() -> NodeCommandEnv {
        NodeCommandEnv {
            node_type: "worker".to_string(),
            node_ip: "10.0.0.2".to_string(),
            head_ip: "10.0.0.1".to_string(),
            node_id: "node-1".to_string(),
            node_seq_id: "1".to_string(),
            provider_type: "aws".to_string(),
            runtime_version: "3.8".to_string(),
            workspace_name: "ws".to_string(),
            cluster_name: "cluster".to_string(),
            quorum_join: false,
        }
    }

    #[test]
    fn every_phase_env_carries_runtime_version() {
        let node_env = env();
        for env in [
            node_env.for_initialization(),
            node_env.for_setup(),
            node_env.for_start(&ResourceBundle::default()),
        ] {
            assert_eq!(env.get(env_vars::RUNTIME_VERSION), Some(&"3.8".to_string()));
        }
    }

    #[test]
    fn start_env_includes_resources_for_cloud_providers() {
        let resources = ResourceBundle::single("CPU", 4.0);
        let env = env().for_start(&resources);
        assert!(env.contains_key(env_vars::RESOURCES));
    }

    #[test]
    fn start_env_excludes_resources_for_onpremise() {
        let mut node_env = env();
        node_env.provider_type = "onpremise".to_string();
        let resources = ResourceBundle::single("CPU", 4.0);
        let env = node_env.for_start(&resources);
        assert!(!env.contains_key(env_vars::RESOURCES));
    }

    #[test]
    fn initialization_commands_run_on_host() {
        let mut executor = MockCommandExecutor::new();
        executor
            .expect_run_with_retry()
            .withf(|_, _, run_env, _, _| *run_env == RunEnv::Host)
            .times(1)
            .returning(|_, _, _, _, _| Ok(()));
        let groups = vec![CommandGroup {
            group_name: "init".to_string(),
            commands: vec!["true".to_string()],
        }];
        let result = run_initialization_commands(&executor, &groups, &BTreeMap::new(), Duration::from_millis(1));
        assert!(result.is_ok());
    }

    #[test]
    fn setup_command_failure_propagates_as_node_updater_error() {
        let mut executor = MockCommandExecutor::new();
        executor.expect_run_with_retry().returning(|_, _, _, _, _| {
            Err(crate::provider::CommandError::CommandFailed {
                cmd: "false".to_string(),
                exit_code: Some(1),
                msg_type: Some("ssh_command_failed".to_string()),
            })
        });
        let groups = vec![CommandGroup {
            group_name: "setup".to_string(),
            commands: vec!["false".to_string()],
        }];
        let err = run_setup_commands(&executor, &groups, &BTreeMap::new(), Duration::from_millis(1))
            .unwrap_err();
        assert_eq!(err.command_failure(), Some(("false", Some(1))));
    }
}
