//! Configuration resolution for sandbox-bridge.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/sandbox-bridge/settings.json)
//! 3. Project config (.sandbox-bridge/settings.json)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binaries)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Backend unit id used when none is configured.
pub const DEFAULT_BACKEND_UNIT_ID: &str = "test-sandbox-fixed-id";

/// File name of the echo server socket inside the temp directory.
pub const ECHO_SOCKET_NAME: &str = "echo-server.sock";

/// Complete sandbox-bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub echo: EchoConfig,
}

/// Client-facing server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub addr: String,
    pub ws_path: String,
    /// Queued event messages per connection before the relay waits.
    pub outbound_capacity: usize,
    pub log_level: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8787".to_string(),
            ws_path: "/ws".to_string(),
            outbound_capacity: 64,
            log_level: "info".to_string(),
        }
    }
}

/// How a backend unit reports its lifecycle on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamFormat {
    /// Plain text; stdout/stderr lines become events, exit status completes.
    #[default]
    Lines,
    /// Server-Sent Events carrying JSON backend events.
    Sse,
}

/// Backend unit (spawned worker) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Program spawned per request.
    pub bin: PathBuf,
    /// Extra leading arguments, before the socket and payload.
    pub args: Vec<String>,
    pub unit_id: String,
    pub stream_format: StreamFormat,
    pub max_processes: usize,
    pub working_directory: Option<PathBuf>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            bin: PathBuf::from("sandbox-echo-client"),
            args: Vec::new(),
            unit_id: DEFAULT_BACKEND_UNIT_ID.to_string(),
            stream_format: StreamFormat::Lines,
            max_processes: 5,
            working_directory: None,
        }
    }
}

/// Echo channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoConfig {
    pub socket_path: PathBuf,
    pub response_timeout_ms: u64,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            socket_path: default_echo_socket_path(),
            response_timeout_ms: 5_000,
        }
    }
}

/// `$TMPDIR/echo-server.sock`.
pub fn default_echo_socket_path() -> PathBuf {
    std::env::temp_dir().join(ECHO_SOCKET_NAME)
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_config_path()
        && global_path.exists()
    {
        config = load_config_file(&global_path)?;
    }

    if let Some(dir) = project_dir {
        let project_path = dir.join(".sandbox-bridge").join("settings.json");
        if project_path.exists() {
            let project = load_config_file(&project_path)?;
            merge_config(&mut config, project);
        }
    }

    apply_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME").ok().map(|h| {
            PathBuf::from(h).join("Library/Application Support/sandbox-bridge/settings.json")
        })
    }
    #[cfg(not(target_os = "macos"))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("sandbox-bridge").join("settings.json"))
    }
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    parse_config(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config file {}: {e}", path.display())))
}

/// Parse a JSON settings document; missing sections take their defaults.
pub fn parse_config(content: &str) -> Result<Config> {
    Ok(serde_json::from_str(content)?)
}

fn merge_config(base: &mut Config, overlay: Config) {
    base.server = overlay.server;
    base.echo = overlay.echo;

    // Keep inherited backend args/working directory when the overlay leaves them unset.
    let BackendConfig {
        bin,
        args,
        unit_id,
        stream_format,
        max_processes,
        working_directory,
    } = overlay.backend;
    base.backend.bin = bin;
    if !args.is_empty() {
        base.backend.args = args;
    }
    base.backend.unit_id = unit_id;
    base.backend.stream_format = stream_format;
    base.backend.max_processes = max_processes;
    if working_directory.is_some() {
        base.backend.working_directory = working_directory;
    }
}

/// Apply `SANDBOX_BRIDGE_*` overrides from a variable lookup.
pub fn apply_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("SANDBOX_BRIDGE_ADDR") {
        config.server.addr = val;
    }
    if let Some(val) = lookup("SANDBOX_BRIDGE_LOG_LEVEL") {
        config.server.log_level = val;
    }
    if let Some(val) = lookup("SANDBOX_BRIDGE_BACKEND_BIN") {
        config.backend.bin = PathBuf::from(val);
    }
    if let Some(val) = lookup("SANDBOX_BRIDGE_UNIT_ID") {
        config.backend.unit_id = val;
    }
    if let Some(n) = lookup("SANDBOX_BRIDGE_MAX_PROCESSES").and_then(|v| v.parse().ok()) {
        config.backend.max_processes = n;
    }
    if let Some(val) = lookup("SANDBOX_BRIDGE_ECHO_SOCKET") {
        config.echo.socket_path = PathBuf::from(val);
    }
    if let Some(n) = lookup("SANDBOX_BRIDGE_ECHO_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        config.echo.response_timeout_ms = n;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_uses_fixed_unit_and_tmp_socket() {
        let config = Config::default();
        assert_eq!(config.backend.unit_id, DEFAULT_BACKEND_UNIT_ID);
        assert_eq!(config.backend.stream_format, StreamFormat::Lines);
        assert!(config.echo.socket_path.ends_with(ECHO_SOCKET_NAME));
        assert_eq!(config.echo.response_timeout_ms, 5_000);
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let config = parse_config(r#"{"backend":{"stream_format":"sse","max_processes":2}}"#).unwrap();
        assert_eq!(config.backend.stream_format, StreamFormat::Sse);
        assert_eq!(config.backend.max_processes, 2);
        assert_eq!(config.backend.unit_id, DEFAULT_BACKEND_UNIT_ID);
        assert_eq!(config.server.ws_path, "/ws");
    }

    #[test]
    fn invalid_document_is_an_error() {
        assert!(parse_config(r#"{"backend":{"stream_format":"xml"}}"#).is_err());
    }

    #[test]
    fn env_overrides_win() {
        let vars: HashMap<&str, &str> = [
            ("SANDBOX_BRIDGE_UNIT_ID", "sandbox-7"),
            ("SANDBOX_BRIDGE_MAX_PROCESSES", "9"),
            ("SANDBOX_BRIDGE_ECHO_TIMEOUT_MS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        apply_overrides(&mut config, |k| vars.get(k).map(ToString::to_string));

        assert_eq!(config.backend.unit_id, "sandbox-7");
        assert_eq!(config.backend.max_processes, 9);
        assert_eq!(config.echo.response_timeout_ms, 5_000);
    }

    #[test]
    fn project_overlay_keeps_inherited_args() {
        let mut base = Config::default();
        base.backend.args = vec!["--verbose".into()];
        let overlay = parse_config(r#"{"backend":{"unit_id":"other"}}"#).unwrap();

        merge_config(&mut base, overlay);

        assert_eq!(base.backend.unit_id, "other");
        assert_eq!(base.backend.args, vec!["--verbose".to_string()]);
    }

    #[test]
    fn load_from_project_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_dir = dir.path().join(".sandbox-bridge");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(
            cfg_dir.join("settings.json"),
            r#"{"server":{"addr":"0.0.0.0:9000"}}"#,
        )
        .unwrap();

        let config = load_config(Some(dir.path())).unwrap();
        if std::env::var("SANDBOX_BRIDGE_ADDR").is_err() {
            assert_eq!(config.server.addr, "0.0.0.0:9000");
        }
    }
}
