//! CLI Module
//!
//! Command-line interface for wabridge using Clap v4.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

pub use commands::load_config;

use crate::config::Config;

/// wabridge - HTTP gateway over a WhatsApp Web session
#[derive(Parser, Debug)]
#[command(name = "wabridge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug mode (debug log level plus rotated log files)
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Run the HTTP gateway and connect to WhatsApp (default)
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind (overrides config)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Write a default configuration file
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show the effective configuration
    Config,

    /// Delete stored WhatsApp credentials so the next start pairs again
    ResetSession {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

/// Main CLI entry point
pub async fn run(cli: Cli, config: Config) -> Result<()> {
    if cli.debug {
        tracing::info!("Debug mode enabled");
    }

    match cli.command {
        None => commands::cmd_serve(config, None, None).await,
        Some(Commands::Serve { port, bind }) => commands::cmd_serve(config, port, bind).await,
        Some(Commands::Init { force }) => commands::cmd_init(force),
        Some(Commands::Config) => commands::cmd_config(&config),
        Some(Commands::ResetSession { force }) => commands::cmd_reset_session(&config, force),
    }
}
