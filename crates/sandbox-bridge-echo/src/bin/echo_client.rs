//! Echo client, spawned by the bridge as a backend unit.
//!
//! Sends its message words (joined with spaces) as one frame and prints the
//! response line to stdout. Diagnostics go to stderr.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use sandbox_bridge_core::config::default_echo_socket_path;
use sandbox_bridge_echo::EchoClient;

#[derive(Parser, Debug)]
#[command(name = "sandbox-echo-client")]
#[command(version, about = "Send one message to the sandbox-bridge echo server")]
struct Args {
    /// Socket path (defaults to $TMPDIR/echo-server.sock)
    #[arg(long, env = "SANDBOX_BRIDGE_ECHO_SOCKET")]
    socket: Option<PathBuf>,

    /// Milliseconds to wait for the response.
    #[arg(long, default_value_t = 5_000, env = "SANDBOX_BRIDGE_ECHO_TIMEOUT_MS")]
    timeout_ms: u64,

    /// Log level filter for stderr diagnostics.
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Message to send; several words are joined with a single space.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    message: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = &args.log_level;
    let log_filter = format!("sandbox_bridge_echo={level},sandbox_echo_client={level}");
    sandbox_bridge_core::tracing_init::init_tracing(&log_filter, false);

    let message = args.message.join(" ");
    if message.is_empty() {
        anyhow::bail!("Usage: sandbox-echo-client [--socket PATH] -- <message>");
    }

    let socket = args.socket.unwrap_or_else(default_echo_socket_path);
    let client = EchoClient::new(&socket).with_timeout(Duration::from_millis(args.timeout_ms));
    debug!(socket = %socket.display(), len = message.len(), "Sending echo request");

    let response = client.request(&message).await?;

    let mut stdout = tokio::io::stdout();
    stdout.write_all(response.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}
