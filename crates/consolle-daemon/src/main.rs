mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use consolle_broker::RequestBroker;
use consolle_core::BackendKind;
use consolle_lock::{JsonFileRegistry, TargetRegistry, acquire_target_lock};
use consolle_socket::{SocketServer, install_shutdown_signals};
use consolle_supervisor::{Backend, EmbeddedBackend, PtySupervisor, Watchdog};
use std::sync::Arc;
use tokio::sync::watch;

use cli::Args;
use config::DaemonConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let args = Args::parse();
    let project_root = args.project_root().context("failed to resolve project root")?;
    let overrides = args.into_overrides();
    let config = DaemonConfig::resolve(&project_root, overrides)
        .context("failed to resolve daemon configuration")?;

    let _lock = acquire_target_lock(&project_root, &config.target)
        .context("another daemon already supervises this target")?;

    tracing::info!(
        target: "consolle_daemon",
        target_name = %config.target,
        socket = %config.socket_path.display(),
        backend = ?config.session.backend,
        "starting consolle daemon"
    );

    let (backend, watchdog): (Arc<dyn Backend>, Option<Watchdog>) = match config.session.backend {
        BackendKind::Pty => {
            let supervisor = PtySupervisor::new(config.session.clone())
                .await
                .context("failed to spawn the supervised console")?;
            let watchdog = Watchdog::spawn(supervisor.clone());
            (supervisor, Some(watchdog))
        }
        BackendKind::EmbedIrb | BackendKind::EmbedRails => {
            (Arc::new(EmbeddedBackend::new(config.session.clone())), None)
        }
    };

    let pid = std::process::id();
    let registry = JsonFileRegistry::new(
        project_root
            .join("tmp")
            .join("cone")
            .join("registry.json"),
    );
    registry
        .record(&config.target, &config.socket_path, pid)
        .context("failed to record target in the session registry")?;

    let broker = RequestBroker::start(backend.clone());
    let server = SocketServer::bind(&config.socket_path, broker.clone())
        .await
        .context("failed to bind the daemon's Unix socket")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    install_shutdown_signals(shutdown_tx);

    let result = server.serve(shutdown_rx).await;

    broker.stop().await;
    backend.stop().await;
    if let Some(watchdog) = watchdog {
        watchdog.stop();
    }
    let _ = registry.remove(&config.target);

    result.context("socket server exited with an error")?;
    tracing::info!(target: "consolle_daemon", target_name = %config.target, "consolle daemon stopped");
    Ok(())
}
