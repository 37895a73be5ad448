//! Runs one fakenet node on a TAP device.
//!
//! Stdout carries the status stream (one JSON object per line); logs go to
//! stderr or to `--log-file`.

use clap::Parser;
use fakenet_core::NetworkConfig;
use fakenet_link::{FrameLink, TapDevice};
use fakenet_stack::{Node, StatusBoard};
use std::fs::File;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fakenet", version, about = "Userspace network node on a TAP device")]
struct Cli {
    /// Network description (TOML).
    config: PathBuf,

    /// Write logs here instead of stderr.
    #[arg(long, env = "FAKENET_LOG_FILE")]
    log_file: Option<PathBuf>,
}

fn init_tracing(log_file: Option<&PathBuf>) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            let file = File::create(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.log_file.as_ref())?;

    let config = NetworkConfig::load(&cli.config)?;
    tracing::info!(config = %cli.config.display(), "loaded network description");

    // 1. Create the TAP device. Its name is the first thing the status reports.
    let tap = TapDevice::open(config.node.tap_name.as_deref())?;
    let status = StatusBoard::stdout();
    status
        .update()
        .child("interface")
        .field("name", tap.name())
        .field("ether_address", config.node.ether_address)
        .write()?;

    // 2. Bring it up and start the protocol actors.
    tap.up()?;
    let mut node = Node::start(config.node, Arc::new(tap), status)?;

    // 3. Run until interrupted or an actor gives up.
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("interrupted, shutting down");
        }
        result = node.wait() => {
            result?;
            tracing::warn!("node stopped");
        }
    }

    Ok(())
}
