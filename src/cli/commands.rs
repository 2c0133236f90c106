//! Subcommand implementations.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::Config;
use crate::connection::{Supervisor, SupervisorOptions};
use crate::gateway::OutboundGateway;
use crate::server::{self, AppState};
use crate::store::CredentialStore;
use crate::utils::RetryConfig;
use crate::whatsapp::WhatsAppFactory;

/// Load configuration from file or defaults
pub fn load_config(config_path: Option<&str>) -> Result<Config> {
    let config = if let Some(path) = config_path {
        Config::load_from_path(path)?
    } else {
        Config::load()?
    };

    config.validate()?;
    Ok(config)
}

/// Run the gateway until Ctrl-C.
pub(crate) async fn cmd_serve(
    mut config: Config,
    port: Option<u16>,
    bind: Option<String>,
) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    config.validate()?;

    let addr: SocketAddr = config
        .server
        .address()
        .parse()
        .with_context(|| format!("Invalid listen address: {}", config.server.address()))?;

    let factory = Arc::new(WhatsAppFactory::new(
        config.whatsapp.clone(),
        RetryConfig::default(),
    ));
    let options = SupervisorOptions {
        retry: config.reconnect.retry_config(),
        notify_on_ready: config.whatsapp.notify_on_ready,
        print_qr_in_terminal: config.whatsapp.print_qr_in_terminal,
    };
    let (supervisor, supervisor_task) = Supervisor::spawn(factory, options);

    let gateway = OutboundGateway::new(supervisor.status().clone(), config.media.base_dir.clone());
    let state = AppState {
        supervisor: supervisor.clone(),
        gateway,
    };
    let (server_task, actual_addr) = server::serve(addr, state).await?;

    tracing::info!(
        "wabridge {} ready on {} (session store: {:?})",
        crate::VERSION,
        actual_addr,
        config.whatsapp.store_path()
    );
    supervisor.start();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutting down");

    supervisor.shutdown().await;
    server_task.abort();
    if let Err(e) = supervisor_task.await {
        tracing::warn!("Supervisor task ended abnormally: {}", e);
    }
    Ok(())
}

/// Initialize configuration file
pub(crate) fn cmd_init(force: bool) -> Result<()> {
    let config_path =
        Config::system_config_path().context("Could not determine config directory")?;

    if config_path.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at: {}\nUse --force to overwrite",
            config_path.display()
        );
    }

    Config::default().save(&config_path)?;

    println!("Configuration initialized at: {}", config_path.display());
    println!("Run 'wabridge serve' and open /login in a browser to pair.");
    Ok(())
}

/// Print the effective configuration
pub(crate) fn cmd_config(config: &Config) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("Failed to render configuration")?;
    println!("{}", rendered);
    println!("# credential store: {}", config.whatsapp.store_path().display());
    if let Some(dir) = crate::logging::get_log_path(config.logging.dir.as_deref()) {
        println!("# logs: {}", dir.display());
    }
    Ok(())
}

/// Delete the credential store
pub(crate) fn cmd_reset_session(config: &Config, force: bool) -> Result<()> {
    let path = config.whatsapp.store_path();
    if !path.exists() {
        println!("No stored session at {}", path.display());
        return Ok(());
    }

    if !force {
        use std::io::{self, Write};
        println!("This deletes the paired WhatsApp session at {}.", path.display());
        print!("Type 'yes' to confirm: ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if input.trim().to_lowercase() != "yes" {
            println!("Cancelled, nothing was deleted");
            return Ok(());
        }
    }

    CredentialStore::remove_files(&path)?;
    tracing::info!("Removed credential store {:?}", path);
    println!("Session removed. The next start will show a new QR code.");
    Ok(())
}
