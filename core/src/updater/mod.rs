//! `NodeUpdater` (§4.2): drives one provisioned node from its raw state to
//! `up-to-date`. The heaviest subsystem in this crate; split into a module
//! per concern so each piece (SSH readiness, file sync, command execution,
//! progress tracking, hashing) is testable in isolation from the full
//! state machine.

pub mod commands;
pub mod error;
pub mod file_sync;
pub mod progress;
pub mod runtime_hash;
pub mod ssh_wait;
#[allow(clippy::module_inception)]
pub mod updater;

pub use commands::NodeCommandEnv;
pub use error::NodeUpdaterError;
pub use progress::{SetupProgress, SetupStep};
pub use runtime_hash::{compute_file_mounts_contents_hash, compute_runtime_hash};
pub use updater::{NodeUpdater, NodeUpdaterSpec};
