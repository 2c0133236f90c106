use anyhow::Result;
use clap::Parser;
use wabridge::{cli, logging};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file before anything else (silently ignore if missing)
    dotenvy::dotenv().ok();

    let cli_args = cli::Cli::parse();
    let config = cli::load_config(cli_args.config.as_deref())?;

    let mut log_config = logging::LogConfig::new()
        .with_debug_mode(cli_args.debug)
        .with_level(config.logging.level.clone());
    if let Some(dir) = config.logging.dir.clone() {
        log_config = log_config.with_log_dir(dir);
    }

    let _guard = logging::init_logging(log_config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    // Keep a week of rotated logs
    if (cli_args.debug || config.logging.dir.is_some())
        && let Ok(removed) = logging::cleanup_old_logs(config.logging.dir.as_deref(), 7)
        && removed > 0
    {
        tracing::info!("Cleaned up {} old log file(s)", removed);
    }

    cli::run(cli_args, config).await
}
