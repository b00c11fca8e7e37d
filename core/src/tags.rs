//! The tag vocabulary CloudTik persists through the `NodeProvider`. Tags are
//! the only channel between an Updater (possibly on another machine) and the
//! controller that observes it on the next tick, so the names here are part
//! of the wire contract, not an implementation detail.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const NODE_STATUS: &str = "cloudtik-node-status";
pub const RUNTIME_CONFIG_HASH: &str = "cloudtik-runtime-config";
pub const FILE_MOUNTS_HASH: &str = "cloudtik-file-mounts-contents";
pub const NODE_SEQ_ID: &str = "cloudtik-node-seq-id";
pub const NODE_TYPE: &str = "cloudtik-node-type";
pub const QUORUM_JOIN: &str = "cloudtik-quorum-join";

/// `node-status` as the canonical state machine from a raw instance to
/// `UpToDate` or `UpdateFailed`. Ordered by variant declaration so that
/// `PartialOrd` reflects the progress order for monotonicity assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeStatus {
    #[serde(rename = "waiting-for-ssh")]
    WaitingForSsh,
    #[serde(rename = "bootstrapping-data-disks")]
    BootstrappingDataDisks,
    #[serde(rename = "syncing-files")]
    SyncingFiles,
    #[serde(rename = "setting-up")]
    SettingUp,
    #[serde(rename = "up-to-date")]
    UpToDate,
    #[serde(rename = "update-failed")]
    UpdateFailed,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::WaitingForSsh => "waiting-for-ssh",
            NodeStatus::BootstrappingDataDisks => "bootstrapping-data-disks",
            NodeStatus::SyncingFiles => "syncing-files",
            NodeStatus::SettingUp => "setting-up",
            NodeStatus::UpToDate => "up-to-date",
            NodeStatus::UpdateFailed => "update-failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeStatus::UpToDate | NodeStatus::UpdateFailed)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown node status `{0}`")]
pub struct UnknownNodeStatus(String);

impl FromStr for NodeStatus {
    type Err = UnknownNodeStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting-for-ssh" => Ok(NodeStatus::WaitingForSsh),
            "bootstrapping-data-disks" => Ok(NodeStatus::BootstrappingDataDisks),
            "syncing-files" => Ok(NodeStatus::SyncingFiles),
            "setting-up" => Ok(NodeStatus::SettingUp),
            "up-to-date" => Ok(NodeStatus::UpToDate),
            "update-failed" => Ok(NodeStatus::UpdateFailed),
            other => Err(UnknownNodeStatus(other.to_string())),
        }
    }
}

/// `quorum-join` lifecycle, tracked separately from `node-status` because a
/// node can be `up-to-date` while its quorum join is still `pending` under
/// restart-only short-circuits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuorumJoin {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "failed")]
    Failed,
}

impl QuorumJoin {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuorumJoin::Pending => "pending",
            QuorumJoin::Success => "success",
            QuorumJoin::Failed => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            NodeStatus::WaitingForSsh,
            NodeStatus::BootstrappingDataDisks,
            NodeStatus::SyncingFiles,
            NodeStatus::SettingUp,
            NodeStatus::UpToDate,
            NodeStatus::UpdateFailed,
        ] {
            assert_eq!(status.as_str().parse::<NodeStatus>().unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!("sleeping".parse::<NodeStatus>().is_err());
    }

    #[test]
    fn ordering_matches_progress() {
        assert!(NodeStatus::WaitingForSsh < NodeStatus::SyncingFiles);
        assert!(NodeStatus::SettingUp < NodeStatus::UpToDate);
    }

    #[test]
    fn only_up_to_date_and_failed_are_terminal() {
        assert!(NodeStatus::UpToDate.is_terminal());
        assert!(NodeStatus::UpdateFailed.is_terminal());
        assert!(!NodeStatus::SettingUp.is_terminal());
    }
}
