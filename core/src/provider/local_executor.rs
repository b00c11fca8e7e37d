//! A `CommandExecutor` that runs commands on the local machine rather than
//! over SSH. Used by the static/reference provider for tests and for
//! single-box on-premise operation where the "remote" node is the box
//! running the controller itself.

use super::{CommandError, CommandExecutor, RsyncOptions, RunEnv};
use std::collections::BTreeMap;
use std::process::Command;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Default, Clone)]
pub struct LocalCommandExecutor;

impl LocalCommandExecutor {
    pub fn new() -> Self {
        Self
    }

    fn run_shell(&self, cmd: &str, env: &BTreeMap<String, String>) -> Result<(), CommandError> {
        let mut command = Command::new("sh");
        command.arg("-c").arg(cmd);
        for (k, v) in env {
            command.env(k, v);
        }
        let status = command
            .status()
            .map_err(|err| CommandError::Transport(err.to_string()))?;
        if status.success() {
            Ok(())
        } else {
            Err(CommandError::CommandFailed {
                cmd: cmd.to_string(),
                exit_code: status.code(),
                msg_type: Some("ssh_command_failed".to_string()),
            })
        }
    }
}

impl CommandExecutor for LocalCommandExecutor {
    fn run(
        &self,
        cmd: &str,
        env: &BTreeMap<String, String>,
        _timeout: Option<Duration>,
        run_env: RunEnv,
    ) -> Result<(), CommandError> {
        debug!(cmd, ?run_env, "running command locally");
        self.run_shell(cmd, env)
    }

    fn run_with_retry(
        &self,
        cmd: &str,
        env: &BTreeMap<String, String>,
        run_env: RunEnv,
        number_of_retries: u32,
        retry_interval: Duration,
    ) -> Result<(), CommandError> {
        crate::utils::retry::retry(number_of_retries.max(1) as usize, retry_interval, || {
            self.run(cmd, env, None, run_env)
        })
    }

    fn run_rsync_up(&self, src: &str, dst: &str, _options: &RsyncOptions) -> Result<(), CommandError> {
        debug!(src, dst, "local rsync-up (copy)");
        copy_tree(src, dst)
    }

    fn run_rsync_down(&self, src: &str, dst: &str, _options: &RsyncOptions) -> Result<(), CommandError> {
        debug!(src, dst, "local rsync-down (copy)");
        copy_tree(src, dst)
    }

    fn run_init(
        &self,
        _as_head: bool,
        _file_mounts: &BTreeMap<String, String>,
        _shared_memory_ratio: f64,
        _sync_run_yet: bool,
    ) -> Result<bool, CommandError> {
        Ok(false)
    }

    fn bootstrap_data_disks(&self) -> Result<(), CommandError> {
        Ok(())
    }
}

fn copy_tree(src: &str, dst: &str) -> Result<(), CommandError> {
    let src_path = std::path::Path::new(src);
    if !src_path.exists() {
        return Ok(());
    }
    if let Some(parent) = std::path::Path::new(dst).parent() {
        std::fs::create_dir_all(parent).map_err(|err| CommandError::Transport(err.to_string()))?;
    }
    if src_path.is_dir() {
        copy_dir_recursive(src_path, std::path::Path::new(dst))
            .map_err(|err| CommandError::Transport(err.to_string()))
    } else {
        std::fs::copy(src_path, dst)
            .map(|_| ())
            .map_err(|err| CommandError::Transport(err.to_string()))
    }
}

fn copy_dir_recursive(src: &std::path::Path, dst: &std::path::Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}
