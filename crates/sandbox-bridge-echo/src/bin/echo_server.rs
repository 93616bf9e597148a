//! Standalone echo server.
//!
//! Listens on a Unix socket and answers every newline-terminated frame with
//! `ECHO: <frame>` until SIGINT or SIGTERM.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use sandbox_bridge_core::config::default_echo_socket_path;
use sandbox_bridge_echo::EchoServer;

#[derive(Parser, Debug)]
#[command(name = "sandbox-echo-server")]
#[command(version, about = "Unix socket echo server for sandbox-bridge")]
struct Args {
    /// Socket path (defaults to $TMPDIR/echo-server.sock)
    #[arg(long, env = "SANDBOX_BRIDGE_ECHO_SOCKET")]
    socket: Option<PathBuf>,

    /// Log level filter (e.g. "info", "debug").
    #[arg(long, default_value = "info", env = "SANDBOX_BRIDGE_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON.
    #[arg(long, env = "SANDBOX_BRIDGE_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = &args.log_level;
    let log_filter = format!("sandbox_bridge_echo={level},sandbox_echo_server={level}");
    sandbox_bridge_core::tracing_init::init_tracing(&log_filter, args.log_json);

    let socket = args.socket.unwrap_or_else(default_echo_socket_path);
    let server = EchoServer::bind(&socket)?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let serve = tokio::spawn(server.serve(shutdown_rx));

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        _ = sigterm_future => {
            info!("Received SIGTERM shutdown signal");
        }
    }

    let _ = shutdown_tx.send(true);
    serve.await??;

    info!("Echo server stopped");
    Ok(())
}
