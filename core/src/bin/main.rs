//! `cloudtik-controller` (§10.7): a thin CLI wiring a YAML cluster config
//! and a handful of flags to `ConfigResolver::bootstrap`, then to the
//! `ClusterController` and status-server runners, in the same
//! "parse args -> build run config -> hand off to a runner" shape the
//! teacher's `run.rs`/`main_onhost.rs` use. This is the thin CLI surface
//! the control plane owns directly, not a full CLI product.

use clap::Parser;
use cloudtik_core::config::registry::ProviderRegistry;
use cloudtik_core::config::{BootstrapOptions, ClusterConfig, ConfigResolver, NoopRuntimeConfigHook};
use cloudtik_core::controller::{ClusterController, ControllerRunner};
use cloudtik_core::defaults::DEFAULT_TMP_DIR;
use cloudtik_core::event::channel::{pub_sub, EventPublisher};
use cloudtik_core::event::ApplicationEvent;
use cloudtik_core::http_server::{Runner as StatusServerRunner, ServerConfig as StatusServerConfig, Status};
use cloudtik_core::provider::static_provider::OnpremiseProviderFactory;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, RwLock};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cloudtik-controller", about = "CloudTik cluster control plane")]
struct Cli {
    /// Path to the cluster config YAML file.
    config: PathBuf,

    /// Skip reading/writing the on-disk config cache (§4.1).
    #[arg(long)]
    no_config_cache: bool,

    /// Directory the config cache and its encryption salt live under.
    #[arg(long, default_value_t = DEFAULT_TMP_DIR.to_string())]
    tmp_dir: String,

    /// Minimum level of emitted log lines, unless `CLOUDTIK_LOG` is set.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Enable the read-only status HTTP server (§10.5).
    #[arg(long)]
    status_server: bool,

    /// Interface the status HTTP server binds to, when enabled.
    #[arg(long)]
    status_host: Option<String>,

    /// Port the status HTTP server binds to, when enabled.
    #[arg(long)]
    status_port: Option<u16>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _log_guard = init_tracing(&cli.log_level, &cli.tmp_dir);

    match run(cli) {
        Ok(()) => {
            info!("cloudtik-controller exited successfully");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("cloudtik-controller exited with an error: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Separated from `main` so errors are logged once, in the controller's own
/// format, rather than once by us and once by the process's default panic
/// hook.
fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let raw_config = std::fs::read_to_string(&cli.config)?;
    let config: ClusterConfig = serde_yaml::from_str(&raw_config)?;

    let mut registry = ProviderRegistry::new();
    registry.register(Box::new(OnpremiseProviderFactory));
    let runtime_hook = NoopRuntimeConfigHook;
    let resolver = ConfigResolver::new(&registry, &runtime_hook, cli.tmp_dir.as_str());

    let resolved = resolver.bootstrap(
        config,
        BootstrapOptions {
            no_cache: cli.no_config_cache,
            ..Default::default()
        },
    )?;

    let provider_type = resolved.provider.provider_type.clone();
    let provider = registry
        .create(&provider_type, &resolved.cluster_name)
        .ok_or_else(|| format!("no provider registered for type '{provider_type}'"))?;

    let status = Arc::new(RwLock::new(Status::default()));

    let mut status_server_config = StatusServerConfig {
        enabled: cli.status_server,
        ..StatusServerConfig::default()
    };
    if let Some(host) = cli.status_host {
        status_server_config.host = host.into();
    }
    if let Some(port) = cli.status_port {
        status_server_config.port = port.into();
    }
    let status_server = StatusServerRunner::start(status_server_config, Arc::clone(&status))?;

    let controller = ClusterController::new(Arc::from(provider), resolved);
    let controller_runner = ControllerRunner::start(controller, status);

    let (stop_publisher, stop_consumer) = pub_sub::<ApplicationEvent>();
    create_shutdown_signal_handler(stop_publisher)?;

    // Block until Ctrl-C (or the publisher side is dropped), then let both
    // runners wind down.
    let _ = stop_consumer.as_ref().recv();
    info!("shutdown requested, stopping the controller and status server");

    controller_runner.stop()?;
    drop(status_server);

    Ok(())
}

fn init_tracing(log_level: &str, tmp_dir: &str) -> tracing_appender::non_blocking::WorkerGuard {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    let filter = EnvFilter::try_from_env("CLOUDTIK_LOG").unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));
    let log_dir = PathBuf::from(tmp_dir).join("cloudtik-logs");
    let file_appender = tracing_appender::rolling::daily(log_dir, "cloudtik-controller.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking.and(std::io::stdout))
        .init();

    guard
}

/// Wires Ctrl-C to `ApplicationEvent::StopRequested` so an operator can stop
/// the controller with the usual keypress at any moment.
fn create_shutdown_signal_handler(publisher: EventPublisher<ApplicationEvent>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        info!("received SIGINT (Ctrl-C), stopping cloudtik-controller");
        let _ = publisher.publish(ApplicationEvent::StopRequested);
    })
}
