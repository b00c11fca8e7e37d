//! File-mount sync (§4.2): push each configured `(remote, local)` pair to
//! the node via the command executor's rsync-up.

use crate::config::model::FileMount;
use crate::provider::{CommandExecutor, RsyncOptions, RunEnv};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Syncs every file mount to the node, in declaration order. A mount whose
/// local source is missing is skipped with a warning rather than failing
/// the whole sync when `allow_non_existing_paths` is set; any other rsync
/// failure is propagated.
pub fn sync_file_mounts(
    executor: &dyn CommandExecutor,
    file_mounts: &[FileMount],
    options: &RsyncOptions,
) -> Result<(), crate::provider::CommandError> {
    for mount in file_mounts {
        let local_path = Path::new(&mount.local_path);
        if !local_path.exists() {
            if mount.allow_non_existing_paths {
                warn!(local = %mount.local_path, remote = %mount.remote_path, "file mount source missing, skipping");
                continue;
            }
            return Err(crate::provider::CommandError::Transport(format!(
                "required file mount source `{}` does not exist",
                mount.local_path
            )));
        }

        let (local, remote) = normalize_mount_paths(&mount.local_path, &mount.remote_path);
        if !options.docker_mount_if_possible {
            create_remote_parent(executor, &remote)?;
        }
        info!(local = %local, remote = %remote, "syncing file mount");
        executor.run_rsync_up(&local, &remote, options)?;
    }
    Ok(())
}

/// Creates the parent directory of `remote` on the node before rsync runs,
/// since rsync itself does not create missing intermediate directories on
/// the destination (§4.2). Skipped when a docker bind mount already
/// creates the path on container start.
fn create_remote_parent(executor: &dyn CommandExecutor, remote: &str) -> Result<(), crate::provider::CommandError> {
    let Some(parent) = remote_parent(remote) else {
        return Ok(());
    };
    executor.run(
        &format!("mkdir -p {parent}"),
        &BTreeMap::new(),
        None,
        RunEnv::Host,
    )
}

/// The parent of a node-side path, computed with `/`-splitting rather than
/// `std::path::Path` since the remote node's path separator is not
/// necessarily the host's.
fn remote_parent(remote: &str) -> Option<String> {
    let trimmed = remote.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(trimmed[..idx].to_string()),
        None => None,
    }
}

/// If the local source is a directory, both paths get a trailing slash so
/// rsync copies the directory's contents rather than the directory itself
/// (rsync's own `src/` vs `src` distinction).
fn normalize_mount_paths(local_path: &str, remote_path: &str) -> (String, String) {
    if Path::new(local_path).is_dir() {
        (ensure_trailing_slash(local_path), ensure_trailing_slash(remote_path))
    } else {
        (local_path.to_string(), remote_path.to_string())
    }
}

fn ensure_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}
