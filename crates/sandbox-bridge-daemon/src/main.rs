//! sandbox-bridge daemon
//!
//! Accepts WebSocket clients and runs each `message` request as a backend
//! unit subprocess, streaming its output back.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use sandbox_bridge_core::config::{StreamFormat, load_config};
use sandbox_bridge_daemon::server::{AppState, Server, ServerConfig};
use sandbox_bridge_daemon::session::SessionRegistry;
use sandbox_bridge_daemon::subprocess::SubprocessManager;
use sandbox_bridge_echo::EchoServer;

#[derive(Parser, Debug)]
#[command(name = "sandbox-bridge")]
#[command(version, about = "Relay WebSocket sessions to backend unit subprocesses")]
struct Args {
    /// TCP bind address (overrides settings)
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Route that accepts WebSocket upgrades (overrides settings)
    #[arg(long)]
    ws_path: Option<String>,

    /// Project directory to read `.sandbox-bridge/settings.json` from
    #[arg(long)]
    project_dir: Option<PathBuf>,

    /// Backend unit binary spawned per request
    #[arg(long)]
    backend_bin: Option<PathBuf>,

    /// Backend unit output format
    #[arg(long, value_parser = ["lines", "sse"])]
    stream_format: Option<String>,

    /// Maximum concurrent backend units
    #[arg(long)]
    max_processes: Option<usize>,

    /// Echo server socket path handed to backend units
    #[arg(long)]
    echo_socket: Option<PathBuf>,

    /// Host the echo server inside the daemon
    #[arg(long, env = "SANDBOX_BRIDGE_EMBEDDED_ECHO")]
    embedded_echo: bool,

    /// Log level filter for the daemon (e.g. "info", "debug", "warn").
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "SANDBOX_BRIDGE_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let project_dir = match args.project_dir {
        Some(dir) => Some(dir),
        None => std::env::current_dir().ok(),
    };
    let mut config = load_config(project_dir.as_deref())?;
    if let Some(addr) = args.addr {
        config.server.addr = addr.to_string();
    }
    if let Some(bin) = args.backend_bin {
        config.backend.bin = bin;
    }
    if let Some(format) = args.stream_format.as_deref() {
        config.backend.stream_format = match format {
            "sse" => StreamFormat::Sse,
            _ => StreamFormat::Lines,
        };
    }
    if let Some(max) = args.max_processes {
        config.backend.max_processes = max;
    }
    if let Some(socket) = args.echo_socket {
        config.echo.socket_path = socket;
    }
    if let Some(level) = args.log_level {
        config.server.log_level = level;
    }

    let level = &config.server.log_level;
    let log_filter = format!(
        "sandbox_bridge_daemon={level},sandbox_bridge={level},sandbox_bridge_echo={level},tower_http={level}"
    );
    sandbox_bridge_core::tracing_init::init_tracing(&log_filter, args.log_json);

    let mut server_config = ServerConfig::from_settings(&config.server)?;
    if let Some(path) = args.ws_path {
        server_config = server_config.with_ws_path(path);
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %server_config.addr,
        ws_path = %server_config.ws_path,
        backend_bin = %config.backend.bin.display(),
        unit_id = %config.backend.unit_id,
        max_processes = config.backend.max_processes,
        echo_socket = %config.echo.socket_path.display(),
        "Starting sandbox-bridge"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let echo_handle = if args.embedded_echo {
        let echo = EchoServer::bind(&config.echo.socket_path)?;
        Some(tokio::spawn(echo.serve(shutdown_tx.subscribe())))
    } else {
        if !config.echo.socket_path.exists() {
            warn!(
                path = %config.echo.socket_path.display(),
                "No echo socket yet; backend units will fail until an echo server is listening"
            );
        }
        None
    };

    let manager = SubprocessManager::new(config.backend.clone(), config.echo.clone());
    let state = AppState::new(
        SessionRegistry::new(),
        Arc::new(manager),
        config.backend.unit_id.clone(),
        server_config.outbound_capacity,
    );
    let server = Server::bind(&server_config, state).await?;
    let addr = server.local_addr()?;
    let mut server_task = tokio::spawn(server.serve(shutdown_rx));

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    // Notify systemd that the daemon is ready to serve (unix only).
    // The `true` parameter unsets $NOTIFY_SOCKET so backend units
    // don't accidentally notify systemd.
    #[cfg(unix)]
    sd_notify::notify(true, &[sd_notify::NotifyState::Ready])?;

    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    info!(%addr, "sandbox-bridge ready");

    tokio::select! {
        result = &mut server_task => {
            result??;
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        _ = sigterm_future => {
            info!("Received SIGTERM shutdown signal");
        }
    }

    let _ = shutdown_tx.send(true);
    server_task.await??;
    if let Some(handle) = echo_handle {
        handle.await??;
    }

    info!("sandbox-bridge stopped");
    Ok(())
}
