//! `ControllerRunner` (§10.7 mirrors the teacher's `run.rs`/`AgentControlRunner`):
//! owns the background thread that drives `ClusterController::tick` on its
//! configured interval until told to stop.

use crate::controller::ClusterController;
use crate::event::cancellation::CancellationMessage;
use crate::event::channel::EventConsumer;
use crate::http_server::Status;
use crate::utils::thread_context::{NotStartedThreadContext, StartedThreadContext, ThreadContextStopperError};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum ControllerRunnerError {
    #[error("controller thread did not stop cleanly: {0}")]
    Stop(#[from] ThreadContextStopperError),
}

/// Owns the controller's tick-loop thread, stopping it gracefully on drop
/// (§5: controller shutdown cancels all Updaters, which `ClusterController::shutdown`
/// handles once the loop itself exits).
pub struct ControllerRunner {
    thread_context: Option<StartedThreadContext>,
}

impl ControllerRunner {
    /// Spawns the tick loop. `status` is refreshed after every tick so the
    /// status HTTP surface (§10.5) can serve it without reaching into the
    /// controller itself, which lives on this thread for its whole life.
    pub fn start(mut controller: ClusterController, status: Arc<RwLock<Status>>) -> Self {
        let tick_interval = controller.tick_interval();

        let callback = move |stop_consumer: EventConsumer<CancellationMessage>| {
            loop {
                match controller.tick() {
                    Ok(scaling) => {
                        if let Ok(mut guard) = status.write() {
                            guard.update_scaling(&scaling);
                        }
                    }
                    Err(err) => error!(error = %err, "controller tick failed"),
                }

                match controller.node_statuses() {
                    Ok(node_statuses) => {
                        if let Ok(mut guard) = status.write() {
                            guard.replace_nodes(node_statuses);
                        }
                    }
                    Err(err) => warn!(error = %err, "failed to refresh node statuses"),
                }

                if stop_consumer.is_cancelled(tick_interval) {
                    break;
                }
            }
            controller.shutdown();
            info!("controller loop stopped");
        };

        let thread_context = NotStartedThreadContext::new("cluster-controller", callback).start();
        Self {
            thread_context: Some(thread_context),
        }
    }

    /// Explicit, checked shutdown for callers (the CLI entry point) that
    /// want to observe stop failures rather than only logging them on drop.
    pub fn stop(mut self) -> Result<(), ControllerRunnerError> {
        let Some(thread_context) = self.thread_context.take() else {
            return Ok(());
        };
        Ok(thread_context.stop_blocking()?)
    }
}

impl Drop for ControllerRunner {
    fn drop(&mut self) {
        info!("waiting for the controller loop to stop gracefully...");
        let Some(thread_context) = self.thread_context.take() else {
            return;
        };
        if let Err(err) = thread_context.stop_blocking() {
            error!(error = %err, "error stopping controller loop");
        }
    }
}
