//! zmem - local-first hybrid memory engine
//!
//! Binary entry point: parses the CLI, loads configuration, resolves the
//! workspace, and dispatches. Logs go to stderr so the `serve` command can
//! keep stdout as a clean JSON-RPC stream.

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use zmem_core::cli::{self, Command};
use zmem_core::config::ZmemConfig;

#[derive(Debug, Parser)]
#[command(name = "zmem", version, about = "Local-first hybrid memory engine")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Workspace to operate on
    #[arg(long, global = true)]
    workspace: Option<String>,

    #[command(subcommand)]
    command: Command,
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("zmem").join("config.json"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("zmem_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.or_else(default_config_path);
    let config = ZmemConfig::load(config_path.as_deref())?;
    let workspace = config.resolve_workspace(cli.workspace.as_deref());

    cli::run(cli.command, config, workspace).await?;
    Ok(())
}
