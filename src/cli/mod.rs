//! CLI module for kubecast
//!
//! Commands:
//! - `serve`: Run the relay
//! - `doctor`: Check cluster connectivity
//! - `config`: Print the resolved configuration

use clap::{Parser, Subcommand, ValueEnum};

pub mod config;
pub mod doctor;

/// Kubernetes event relay
#[derive(Parser, Debug)]
#[command(name = "kubecast")]
#[command(about = "Relays Kubernetes cluster events to WebSocket subscribers")]
#[command(version)]
pub struct Cli {
    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the relay
    Serve,
    /// Check credentials and API server access
    Doctor,
    /// Print the resolved configuration as TOML
    Config,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable
    Text,
    /// One JSON object per line
    Json,
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Serve) => crate::server::run().await,
        Some(Commands::Doctor) => doctor::run().await,
        Some(Commands::Config) => config::run(),
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}
