//! mirai-bridge
//!
//! Runs the bridge for the configured identities and logs every push event
//! until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use mirai_bridge::config::{load_config, load_config_from, validate_config, LogConfig};
use mirai_bridge::{Adapter, Bot, Error, Event, EventHandler, LifecycleHooks, Result, VERSION};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "mirai-bridge",
    version = VERSION,
    about = "Bridge to a mirai-api-http gateway",
    long_about = None
)]
struct Cli {
    /// Config file (JSON5 or TOML); defaults to the user config directory
    #[arg(long, short, env = "MIRAI_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level filter, overrides the config file
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,
}

/// Logs every event it receives
struct LoggingHandler;

#[async_trait]
impl EventHandler for LoggingHandler {
    async fn process_event(&self, bot: Bot, event: Event) -> Result<()> {
        info!(
            bot = %bot.identity(),
            kind = %event.kind,
            "Event: {}",
            event.payload
        );
        Ok(())
    }
}

struct LoggingHooks;

#[async_trait]
impl LifecycleHooks for LoggingHooks {
    async fn on_connect(&self, bot: &Bot) {
        info!("Bot {} is online", bot.identity());
    }

    async fn on_disconnect(&self, bot: &Bot) {
        warn!("Bot {} went offline", bot.identity());
    }
}

fn init_logging(log: &LogConfig) {
    let filter = EnvFilter::try_new(&log.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if log.format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    if let Some(level) = cli.log_level {
        config.log.level = level;
    }

    init_logging(&config.log);
    info!("Starting mirai-bridge v{}", VERSION);

    let validation = validate_config(&config);
    for warning in &validation.warnings {
        warn!("Config: {}", warning);
    }
    if !validation.valid {
        for issue in &validation.errors {
            error!("Config: {}", issue);
        }
        return Err(Error::Config(format!(
            "{} configuration error(s)",
            validation.errors.len()
        )));
    }

    let adapter = Adapter::new(config, Arc::new(LoggingHandler)).with_hooks(Arc::new(LoggingHooks));
    adapter.start().await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }

    info!("Shutting down");
    adapter.shutdown().await;
    Ok(())
}
