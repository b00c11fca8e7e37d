//! Status HTTP surface (§10.5): a minimal `actix-web` server exposing the
//! `ScalingStatus` published by `ClusterController::tick` (§4.5 step 8) and
//! each node's current `node-status` tag as read-only JSON. Loopback-bound
//! and disabled by default; this is the one outward-facing surface the core
//! owns directly, and it accepts no control commands.

pub mod config;
pub mod runner;
mod server;
pub(super) mod status;
mod status_handler;

pub use config::ServerConfig;
pub use runner::Runner;
pub use status::Status;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatusServerError {
    #[error("failed to bind status server: {0}")]
    BindError(String),
    #[error("status server startup timed out after {0:?}")]
    StartupTimeout(std::time::Duration),
    #[error("status server thread failed during startup")]
    StartupChannelClosed,
}
