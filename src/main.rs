use std::path::PathBuf;

use clap::Parser;
use tokio::sync::mpsc;

use stream_relay::config::{read_config, validate_config, ConfigError, ConfigWatcher, LogFormat};
use stream_relay::lifecycle::{self, Shutdown};
use stream_relay::observability::init_logging;
use stream_relay::RelayConfig;

#[derive(Parser, Debug, Clone)]
#[command(name = "stream-relay")]
#[command(about = "Relay an internet audio stream with cross-origin headers", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Upstream stream URL (overrides the file).
    #[arg(long, env = "RELAY_UPSTREAM_URL")]
    upstream_url: Option<String>,

    /// Listen address (overrides the file).
    #[arg(long, env = "RELAY_BIND_ADDRESS")]
    bind: Option<String>,

    /// Log format (overrides the file).
    #[arg(long, value_parser = parse_log_format)]
    log_format: Option<LogFormat>,

    /// Reload the configuration file when it changes.
    #[arg(long, requires = "config")]
    watch: bool,
}

impl Cli {
    fn apply(&self, mut config: RelayConfig) -> RelayConfig {
        if let Some(url) = &self.upstream_url {
            config.upstream.url = url.clone();
        }
        if let Some(bind) = &self.bind {
            config.listener.bind_address = bind.clone();
        }
        if let Some(format) = self.log_format {
            config.observability.log_format = format;
        }
        config
    }

    fn load(&self) -> Result<RelayConfig, ConfigError> {
        let base = match &self.config {
            Some(path) => read_config(path)?,
            None => RelayConfig::default(),
        };
        let config = self.apply(base);
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    match value {
        "pretty" => Ok(LogFormat::Pretty),
        "json" => Ok(LogFormat::Json),
        other => Err(format!("unknown log format `{other}`, expected pretty or json")),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let config = cli.load()?;

    init_logging(&config.observability.log_level, config.observability.log_format)?;

    tracing::info!("stream-relay v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.url,
        tls = config.listener.tls.is_some(),
        retries = config.retries.enabled,
        "Configuration loaded"
    );

    // The watcher must stay alive for reloads to keep arriving.
    let (_watcher, config_updates) = match (&cli.config, cli.watch) {
        (Some(path), true) => {
            let overrides = cli.clone();
            let (watcher, updates) = ConfigWatcher::new(path, move |c| overrides.apply(c));
            (Some(watcher.run()?), updates)
        }
        _ => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let shutdown = Shutdown::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = lifecycle::wait_for_signal().await {
            tracing::error!(error = %e, "Failed to install signal handlers");
        }
        signal_shutdown.trigger();
    });

    if let Err(e) = lifecycle::start(config, config_updates, &shutdown).await {
        tracing::error!(error = %e, "Relay failed");
        return Err(e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
