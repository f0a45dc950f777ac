//! # hubcast
//!
//! `hubcast serve` runs the relay; `hubcast watch` follows a relay's stream
//! and prints the merged projection.

#![deny(unsafe_code)]

mod watch;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hubcast_logging::LogFormat;
use hubcast_server::{HubcastServer, RedisBackbone, ServerConfig};
use hubcast_settings::HubcastSettings;

/// Hub count relay.
#[derive(Parser, Debug)]
#[command(name = "hubcast", about = "Relay hub counts from Redis to SSE clients")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the relay server.
    Serve(ServeArgs),
    /// Follow a relay stream and print the projection.
    Watch(WatchArgs),
}

#[derive(clap::Args, Debug, Default)]
struct ServeArgs {
    /// Settings file (defaults to `~/.hubcast/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Redis host.
    #[arg(long)]
    redis_host: Option<String>,

    /// Redis port.
    #[arg(long)]
    redis_port: Option<u16>,

    /// Pub/sub channel to relay.
    #[arg(long)]
    channel: Option<String>,

    /// Log level or `EnvFilter` directive.
    #[arg(long)]
    log_level: Option<String>,

    /// `compact` or `json`.
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl ServeArgs {
    /// Flags win over every settings layer.
    fn apply(&self, settings: &mut HubcastSettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ref host) = self.redis_host {
            settings.backbone.host.clone_from(host);
        }
        if let Some(port) = self.redis_port {
            settings.backbone.port = port;
        }
        if let Some(ref channel) = self.channel {
            settings.backbone.channel.clone_from(channel);
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
        if let Some(format) = self.log_format {
            settings.logging.format = format.to_string();
        }
    }
}

#[derive(clap::Args, Debug)]
struct WatchArgs {
    /// Stream URL, e.g. `http://localhost:3000/sse`.
    #[arg(long)]
    url: String,

    /// Print every updated cell with its fill opacity.
    #[arg(long)]
    cells: bool,

    /// Reconnect this many seconds after a stream failure.
    #[arg(long)]
    retry_secs: Option<u64>,

    /// Settings file for the opacity scale.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn load_settings(path: Option<&PathBuf>) -> Result<HubcastSettings> {
    let path = path.cloned().unwrap_or_else(hubcast_settings::settings_path);
    hubcast_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))
}

async fn serve(args: ServeArgs) -> Result<()> {
    let mut settings = load_settings(args.config.as_ref())?;
    args.apply(&mut settings);
    settings.validate().context("Invalid settings after CLI overrides")?;

    let format: LogFormat = settings
        .logging
        .format
        .parse()
        .context("Invalid log format")?;
    hubcast_logging::init_subscriber(&settings.logging.level, format);

    let metrics =
        hubcast_server::metrics::install_recorder().context("Failed to install metrics recorder")?;

    let redis_url = settings.backbone.redis_url();
    let backbone =
        RedisBackbone::open(&redis_url).with_context(|| format!("Invalid Redis URL {redis_url}"))?;

    let config = ServerConfig::from_settings(&settings);
    let handle = HubcastServer::new(config, Arc::new(backbone))
        .with_metrics(metrics)
        .start()
        .await
        .context("Failed to start server")?;

    tracing::info!(
        "hubcast listening on http://{}/sse (channel {}, redis {})",
        handle.addr(),
        settings.backbone.channel,
        redis_url
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    handle.shutdown().await.context("Server shutdown failed")?;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn watch(args: WatchArgs) -> Result<()> {
    let settings = load_settings(args.config.as_ref())?;
    hubcast_logging::init_subscriber(&settings.logging.level, LogFormat::Compact);

    let options = watch::WatchOptions {
        url: args.url,
        show_cells: args.cells,
        retry: args.retry_secs.map(Duration::from_secs),
        scale: settings.opacity,
    };
    let mut stdout = std::io::stdout();
    tokio::select! {
        res = watch::run(&options, &mut stdout) => res,
        res = tokio::signal::ctrl_c() => res.context("Failed to listen for ctrl-c"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    match Cli::parse().command {
        Command::Serve(args) => serve(args).await,
        Command::Watch(args) => watch(args).await,
    }
}
