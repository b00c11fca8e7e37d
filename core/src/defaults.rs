//! Constants mirrored from the control plane's reference source: retry
//! counts, timing intervals and environment variable names that external
//! collaborators (NodeProvider, CommandExecutor, runtime scripts) depend on
//! by exact value or exact spelling.

use cfg_if::cfg_if;
use std::time::Duration;

pub const CONFIG_CACHE_VERSION: u32 = 1;

pub const NUM_SETUP_STEPS: u32 = 8;

pub const READY_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Overall deadline for the SSH readiness wait (§4.2). Bounds both the
/// connection-refused backoff anchor and ordinary per-attempt retries.
pub const CLOUDTIK_NODE_START_WAIT_S: Duration = Duration::from_secs(600);

/// Per-attempt timeout for a single `uptime` probe during the SSH
/// readiness wait.
pub const SSH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

pub const INITIALIZATION_COMMAND_DEFAULT_NUMBER_OF_RETRIES: u32 = 30;
pub const SETUP_COMMAND_DEFAULT_NUMBER_OF_RETRIES: u32 = 5;
pub const START_COMMAND_DEFAULT_NUMBER_OF_RETRIES: u32 = 3;

/// Bounds how many demand bundles the scheduler will bin-pack in one tick.
pub const CLOUDTIK_MAX_RESOURCE_DEMAND_VECTOR_SIZE: usize = 10_000;

/// `summary()` reports memory in these units rather than raw bytes.
pub const CLOUDTIK_MEMORY_RESOURCE_UNIT_BYTES: f64 = 1024.0 * 1024.0 * 1024.0;

pub const CONTROLLER_TICK_INTERVAL: Duration = Duration::from_secs(5);

cfg_if! {
    if #[cfg(target_family = "windows")] {
        pub const DEFAULT_TMP_DIR: &str = r"C:\Windows\Temp";
    } else {
        pub const DEFAULT_TMP_DIR: &str = "/tmp";
    }
}

pub fn config_cache_dir(tmp_dir: &str) -> std::path::PathBuf {
    std::path::Path::new(tmp_dir).join("configs")
}

pub fn config_cache_path(tmp_dir: &str, config_hash: &str) -> std::path::PathBuf {
    config_cache_dir(tmp_dir).join(format!("cloudtik-config-{config_hash}"))
}

/// Environment variable names injected into every command executed on a
/// node (§6). Kept as constants rather than inline literals since runtime
/// setup scripts outside this crate depend on the exact spelling.
pub mod env_vars {
    pub const NODE_TYPE: &str = "CLOUDTIK_NODE_TYPE";
    pub const NODE_IP: &str = "CLOUDTIK_NODE_IP";
    pub const HEAD_IP: &str = "CLOUDTIK_HEAD_IP";
    pub const NODE_ID: &str = "CLOUDTIK_NODE_ID";
    pub const NODE_SEQ_ID: &str = "CLOUDTIK_NODE_SEQ_ID";
    pub const PROVIDER_TYPE: &str = "CLOUDTIK_PROVIDER_TYPE";
    /// Reports the control plane's own runtime identity (§6); named after
    /// the original Python control plane's env var so existing runtime
    /// setup scripts that branch on it keep working unmodified.
    pub const RUNTIME_VERSION: &str = "CLOUDTIK_RUNTIME_ENV_PYTHON_VERSION";
    pub const WORKSPACE_NAME: &str = "CLOUDTIK_WORKSPACE_NAME";
    pub const CLUSTER_NAME: &str = "CLOUDTIK_CLUSTER_NAME";
    pub const QUORUM_JOIN: &str = "CLOUDTIK_QUORUM_JOIN";
    pub const RESOURCES: &str = "CLOUDTIK_RESOURCES";
}

/// Provider types for which the `CLOUDTIK_RESOURCES` override is withheld
/// from start commands, since the node reports its own hardware.
pub const RESOURCES_OVERRIDE_EXEMPT_PROVIDERS: &[&str] = &["onpremise"];

/// Value reported in `env_vars::RUNTIME_VERSION` when a runtime config
/// doesn't pin one explicitly.
pub const DEFAULT_RUNTIME_VERSION: &str = "3.8";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_path_embeds_hash_under_configs_dir() {
        let path = config_cache_path("/tmp", "abc123");
        assert_eq!(path, std::path::PathBuf::from("/tmp/configs/cloudtik-config-abc123"));
    }

    #[test]
    fn onpremise_is_resources_override_exempt() {
        assert!(RESOURCES_OVERRIDE_EXEMPT_PROVIDERS.contains(&"onpremise"));
    }
}
