//! Configuration resolution for the relay server.
//!
//! Resolution order (lowest to highest priority):
//! 1. Built-in defaults
//! 2. Optional JSON settings file (`--config`)
//! 3. CLI arguments / environment variables (applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::Mode;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 3000;

/// Complete server configuration. Read-only once the server has started.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    /// TCP port to listen on (all interfaces).
    pub port: u16,
    /// Working directory for every executed command.
    pub project_root: PathBuf,
    /// Seconds to wait for open connections after a shutdown signal.
    pub shutdown_grace_secs: u64,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            project_root: std::env::current_dir().unwrap_or_default(),
            shutdown_grace_secs: 10,
            executor: ExecutorConfig::default(),
        }
    }
}

/// Executor limits and interpreter paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutorConfig {
    /// Shell used for `Terminal` mode, invoked as `<shell> -c <message>`.
    pub shell: PathBuf,
    /// Agent executable used for `cursor-agent` mode.
    pub agent_bin: PathBuf,
    /// Non-interactive arguments passed to the agent; the message goes to stdin.
    pub agent_args: Vec<String>,
    pub terminal_timeout_secs: u64,
    pub agent_timeout_secs: u64,
    /// Cap on combined stdout + stderr bytes.
    pub max_output_bytes: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            shell: PathBuf::from("bash"),
            agent_bin: PathBuf::from("cursor-agent"),
            agent_args: ["agent", "-p", "--output-format", "text"]
                .into_iter()
                .map(String::from)
                .collect(),
            terminal_timeout_secs: 30,
            agent_timeout_secs: 60,
            max_output_bytes: 10 * 1024 * 1024, // 10 MB
        }
    }
}

impl ExecutorConfig {
    /// Wall-clock timeout for a command in `mode`.
    pub const fn timeout_for(&self, mode: Mode) -> Duration {
        match mode {
            Mode::Terminal => Duration::from_secs(self.terminal_timeout_secs),
            Mode::Agent => Duration::from_secs(self.agent_timeout_secs),
        }
    }
}

impl ServerConfig {
    /// Check values that would make the server unusable.
    pub fn validate(&self) -> Result<()> {
        if !self.project_root.is_dir() {
            return Err(Error::Config(format!(
                "Project root is not a directory: {}",
                self.project_root.display()
            )));
        }
        if self.executor.terminal_timeout_secs == 0 || self.executor.agent_timeout_secs == 0 {
            return Err(Error::Config("Timeouts must be at least 1 second".into()));
        }
        if self.executor.max_output_bytes == 0 {
            return Err(Error::Config("maxOutputBytes must be non-zero".into()));
        }
        Ok(())
    }

    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Load configuration: defaults, overlaid by `path` when given.
pub fn load_config(path: Option<&Path>) -> Result<ServerConfig> {
    match path {
        Some(path) => load_config_file(path),
        None => Ok(ServerConfig::default()),
    }
}

/// Read a JSON settings file. Missing keys keep their defaults.
pub fn load_config_file(path: &Path) -> Result<ServerConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}
