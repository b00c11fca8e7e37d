use crate::event::cancellation::CancellationMessage;
use crate::event::channel::EventConsumer;
use crate::http_server::config::{ServerConfig, DEFAULT_WORKERS};
use crate::http_server::status::Status;
use crate::http_server::status_handler::status_handler;
use crate::utils::threads::spawn_named_thread;
use actix_web::dev::Server;
use actix_web::rt::System;
use actix_web::{web, App, HttpServer};
use std::sync::mpsc::Sender;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, error, info};

/// Builds and runs the status server on its own dedicated actix runtime,
/// blocking the calling thread until `stop_consumer` fires (§10.5). Unlike
/// the teacher's tokio-based bridge, this crate has no async runtime of its
/// own, so the status server gets a private `actix_web::rt::System` rather
/// than sharing one threaded through the rest of the control plane.
/// `startup_publisher` is signalled exactly once with the bind outcome.
pub(super) fn run_status_server(
    server_config: ServerConfig,
    status: Arc<RwLock<Status>>,
    stop_consumer: EventConsumer<CancellationMessage>,
    startup_publisher: Sender<Result<(), String>>,
) {
    info!(
        "starting status HTTP server at http://{}:{}",
        server_config.host, server_config.port
    );

    let bind_addr = (server_config.host.to_string(), server_config.port.clone().into());
    let status_data = web::Data::new(status);

    let system = System::new();
    let bound: std::io::Result<Server> = system.block_on(async move {
        let http_server = HttpServer::new(move || {
            App::new()
                .app_data(status_data.clone())
                .service(web::resource("/status").to(status_handler))
        })
        .workers(DEFAULT_WORKERS)
        .bind(bind_addr)?;
        Ok(http_server.run())
    });

    let server = match bound {
        Ok(server) => server,
        Err(err) => {
            let _ = startup_publisher.send(Err(err.to_string()));
            return;
        }
    };

    let handle = server.handle();
    let _ = startup_publisher.send(Ok(()));

    // The watcher runs on a plain OS thread so the cancellation channel's
    // blocking `recv_timeout` never stalls the server's own runtime; it
    // drives `handle.stop` on a throwaway system of its own since stopping
    // only needs an executor to poll the acknowledgement, not this one.
    let watcher = spawn_named_thread("status-server-watch", move || {
        loop {
            if stop_consumer.is_cancelled(Duration::from_millis(200)) {
                break;
            }
        }
        System::new().block_on(handle.stop(true));
    });

    if let Err(err) = system.block_on(server) {
        error!(error_msg = %err, "status server exited with an error");
    }
    let _ = watcher.join();
    debug!("status server gracefully stopped");
}
