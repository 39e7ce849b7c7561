//! CLI entry point for magsim.
//!
//! Run the service with an interactive console:
//! ```bash
//! magsim serve --config config/magsim.toml
//! ```
//!
//! Try it without a physics model:
//! ```bash
//! magsim --fake-model serve
//! ```

#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use magsim::console;
use magsim::{launch, tracing_init, MagnetService, ModelBackend, ServiceChannels, Settings};
use magsim_core::channel::ChannelAccess;
use tokio::io::BufReader;
use tokio::signal;
use tracing::info;

#[derive(Parser)]
#[command(name = "magsim")]
#[command(about = "Simulated magnet control service backed by a physics model", long_about = None)]
struct Cli {
    /// Configuration file (TOML). Defaults to config/magsim.toml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the built-in in-process model instead of connecting over TCP
    #[arg(long, global = true)]
    fake_model: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bootstrap magnets and run the channel console on stdin/stdout
    Serve,

    /// Bootstrap magnets and print every channel name
    Channels {
        /// Only list channels starting with this prefix
        #[arg(long, default_value = "")]
        prefix: String,

        /// Print each channel's metadata as one JSON object per line
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref())?;
    tracing_init::init_from_settings(&settings).map_err(|e| anyhow!(e))?;

    let backend = if cli.fake_model {
        ModelBackend::Fake
    } else {
        ModelBackend::Remote
    };

    match cli.command {
        Commands::Serve => serve(&settings, backend).await,
        Commands::Channels { prefix, json } => {
            let service = launch(&settings, backend).await?;
            let result = list_channels(&ServiceChannels::new(Arc::clone(&service)), &prefix, json);
            shutdown(&service).await;
            result
        }
        Commands::Config => {
            print!("{}", settings.to_toml()?);
            Ok(())
        }
    }
}

async fn serve(settings: &Settings, backend: ModelBackend) -> Result<()> {
    let service = launch(settings, backend).await?;
    info!(magnets = service.len(), "Magnet service ready; type 'help' for commands");

    let channels = ServiceChannels::new(Arc::clone(&service));
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    let result = tokio::select! {
        res = console::run(&channels, stdin, stdout) => res.context("Console I/O failed"),
        _ = signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down");
            Ok(())
        }
    };

    shutdown(&service).await;
    result
}

fn list_channels(channels: &ServiceChannels, prefix: &str, json: bool) -> Result<()> {
    for name in channels
        .channel_names()
        .into_iter()
        .filter(|name| name.starts_with(prefix))
    {
        if json {
            let metadata = channels.describe(&name)?;
            println!("{}", serde_json::to_string(&metadata)?);
        } else {
            println!("{name}");
        }
    }
    Ok(())
}

async fn shutdown(service: &MagnetService) {
    service.shutdown().await;
    info!("Model connection closed");
}
