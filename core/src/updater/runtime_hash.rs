//! Content hashes used by the Updater's idempotence check (§4.2): the
//! `runtime_hash` over command groups + runtime config, and the
//! `file_mounts_contents_hash` over the local side of synced file mounts.

use crate::config::model::{ClusterConfig, CommandGroup, FileMount};
use fs::file::reader::FileReader;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Content hash over the ordered command groups plus runtime config (§9
/// glossary: "Runtime hash"). Ordering matters: the three command-group
/// lists are hashed in declaration order, not sorted, since reordering
/// setup commands can change behavior even when the set is identical.
pub fn compute_runtime_hash(config: &ClusterConfig) -> String {
    let mut hasher = Sha256::new();
    hash_command_groups(&mut hasher, &config.initialization_commands);
    hash_command_groups(&mut hasher, &config.setup_commands);
    hash_command_groups(&mut hasher, &config.start_commands);
    let runtime_config_json =
        serde_json::to_vec(&config.runtime_config).unwrap_or_default();
    hasher.update(&runtime_config_json);
    format!("{:x}", hasher.finalize())
}

fn hash_command_groups(hasher: &mut Sha256, groups: &[CommandGroup]) {
    for group in groups {
        hasher.update(group.group_name.as_bytes());
        for cmd in &group.commands {
            hasher.update(cmd.as_bytes());
        }
    }
}

/// Content hash over the local side of every file mount that doesn't
/// tolerate a missing source (`allow_non_existing_paths` sources that are
/// absent are log-and-skip per §4.2, and therefore excluded here too since
/// there is nothing to hash). Directories are hashed shallowly, by entry
/// name, since a full recursive content hash isn't needed to detect "this
/// mount changed" for the common case of a handful of config files.
pub fn compute_file_mounts_contents_hash(
    file_mounts: &[FileMount],
    reader: &dyn FileReader,
) -> Option<String> {
    if file_mounts.is_empty() {
        return None;
    }
    let mut hasher = Sha256::new();
    let mut sorted: Vec<&FileMount> = file_mounts.iter().collect();
    sorted.sort_by(|a, b| a.remote_path.cmp(&b.remote_path));
    for mount in sorted {
        let local = Path::new(&mount.local_path);
        hasher.update(mount.remote_path.as_bytes());
        if local.is_dir() {
            if let Ok(mut entries) = reader.dir_entries(local) {
                entries.sort();
                for entry in entries {
                    hasher.update(entry.to_string_lossy().as_bytes());
                }
            }
        } else if let Ok(contents) = reader.read(local) {
            hasher.update(contents.as_bytes());
        } else if !mount.allow_non_existing_paths {
            // A required source that can't be read still participates in
            // the hash (by its absence marker) so a later fix is detected
            // as a change rather than silently matching the broken state.
            hasher.update(b"<missing>");
        }
    }
    Some(format!("{:x}", hasher.finalize()))
}
