use crate::provider::{CommandError, ProviderError};
use thiserror::Error;

/// Errors raised while driving one node through the Updater state machine
/// (§4.2, §7). Every variant that flips a node to `update-failed` carries
/// enough structure to identify the failing operation without parsing
/// `Display` output (S6).
#[derive(Debug, Error)]
pub enum NodeUpdaterError {
    #[error("ssh command failed: {0}")]
    Command(#[from] CommandError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("node did not become reachable over ssh within the deadline")]
    SshTimeout,

    #[error("node was terminated while waiting for it to become ready")]
    NodeTerminated,

    #[error("cancelled")]
    Cancelled,
}

impl NodeUpdaterError {
    /// The failing command and exit code, when this error originated from a
    /// command execution, for S6-style assertions.
    pub fn command_failure(&self) -> Option<(&str, Option<i32>)> {
        match self {
            NodeUpdaterError::Command(CommandError::CommandFailed { cmd, exit_code, .. }) => {
                Some((cmd.as_str(), *exit_code))
            }
            _ => None,
        }
    }
}
