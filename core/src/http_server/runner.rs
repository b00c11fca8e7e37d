use crate::event::cancellation::CancellationMessage;
use crate::event::channel::EventConsumer;
use crate::http_server::config::ServerConfig;
use crate::http_server::server::run_status_server;
use crate::http_server::status::Status;
use crate::http_server::StatusServerError;
use crate::utils::thread_context::{NotStartedThreadContext, StartedThreadContext};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, error, info};

const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Spawns and owns the status server's dedicated OS thread, stopping it on
/// drop (§10.5, mirroring the teacher's `http_server/runner.rs`).
pub struct Runner {
    thread_context: Option<StartedThreadContext>,
}

impl Runner {
    /// Starts the server if `config.enabled`, otherwise spawns a thread that
    /// just drains the cancellation channel so the caller never needs to
    /// special-case "no status server" when shutting down.
    pub fn start(config: ServerConfig, status: Arc<RwLock<Status>>) -> Result<Self, StatusServerError> {
        if !config.enabled {
            info!("status HTTP server disabled");
            let thread_context = NotStartedThreadContext::new("status-server", |stop_consumer: EventConsumer<CancellationMessage>| {
                let _ = stop_consumer.is_cancelled(Duration::from_secs(u64::MAX / 2));
            })
            .start();
            return Ok(Self {
                thread_context: Some(thread_context),
            });
        }

        let (startup_publisher, startup_consumer) = std::sync::mpsc::channel();

        let callback = move |stop_consumer: EventConsumer<CancellationMessage>| {
            run_status_server(config, status, stop_consumer, startup_publisher);
        };

        let thread_context = NotStartedThreadContext::new("status-server", callback).start();

        startup_consumer
            .recv_timeout(STARTUP_TIMEOUT)
            .map_err(|err| match err {
                std::sync::mpsc::RecvTimeoutError::Timeout => StatusServerError::StartupTimeout(STARTUP_TIMEOUT),
                std::sync::mpsc::RecvTimeoutError::Disconnected => StatusServerError::StartupChannelClosed,
            })?
            .map_err(StatusServerError::BindError)?;

        Ok(Self {
            thread_context: Some(thread_context),
        })
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        info!("waiting for status server to stop gracefully...");
        let Some(thread_context) = self.thread_context.take() else {
            return;
        };
        if let Err(err) = thread_context.stop() {
            error!(error_msg = %err, "error stopping status server");
        } else {
            debug!("status server thread stopped");
        }
    }
}
