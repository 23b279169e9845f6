//! `remoteme` - remote terminal control server.
//!
//! Accepts WebSocket clients and runs their commands in the directory the
//! server was started from.

use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing::info;

use remoteme_core::config::{self, ServerConfig};
use remoteme_core::tracing_init;
use remoteme_server::Server;
use remoteme_server::server::shutdown_signal;

#[derive(Parser, Debug)]
#[command(name = "remoteme")]
#[command(version, about = "Remote CLI - terminal control server")]
struct Cli {
    /// Without a subcommand the help text is printed.
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the control server in the current (or given) project directory.
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Port to listen on (all interfaces).
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Directory commands run in. Defaults to the current directory.
    #[arg(long, env = "REMOTEME_PROJECT_ROOT")]
    project_root: Option<PathBuf>,

    /// JSON settings file; CLI flags override its values.
    #[arg(long, env = "REMOTEME_CONFIG")]
    config: Option<PathBuf>,

    /// Shell used for Terminal mode.
    #[arg(long, env = "REMOTEME_SHELL")]
    shell: Option<PathBuf>,

    /// Agent executable used for cursor-agent mode.
    #[arg(long, env = "REMOTEME_AGENT_BIN")]
    agent_bin: Option<PathBuf>,

    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long, default_value = "info", env = "REMOTEME_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "REMOTEME_LOG_JSON")]
    log_json: bool,
}

impl ServeArgs {
    fn resolve_config(&self) -> anyhow::Result<ServerConfig> {
        let mut config = config::load_config(self.config.as_deref())?;
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(root) = &self.project_root {
            config.project_root = root.clone();
        }
        if let Some(shell) = &self.shell {
            config.executor.shell = shell.clone();
        }
        if let Some(agent_bin) = &self.agent_bin {
            config.executor.agent_bin = agent_bin.clone();
        }
        config.project_root = config.project_root.canonicalize().unwrap_or(config.project_root);
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let Some(Command::Serve(args)) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    tracing_init::init_tracing(&tracing_init::default_filter(&args.log_level), args.log_json);

    let config = args.resolve_config()?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.port,
        project_root = %config.project_root.display(),
        "Starting remoteme"
    );

    let server = Server::new(config);
    let listener = server.bind().await?;
    server.run(listener, shutdown_signal()).await?;
    Ok(())
}
