//! rokubridge daemon - main entry point
//!
//! Keeps home-automation accessories in step with the media players on the
//! network and serves a small REST API over them.

mod api;
mod config;
mod server;
mod state;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "rokubridge")]
#[command(about = "Media player discovery and accessory bridge daemon")]
#[command(version)]
struct Args {
    /// TOML file with [daemon], [discovery] and [[device]] sections;
    /// built-in defaults apply when it doesn't exist
    #[arg(short, long, default_value = "rokubridge.toml")]
    config: PathBuf,

    /// Address for the accessory REST API, overriding `daemon.bind`
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Run one discovery cycle against the cached accessories, print the
    /// cycle counts and every accessory (name, identity, address, model,
    /// app count), then exit without starting the API
    #[arg(long)]
    scan_once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Unknown levels fall back to info
    let level = args.log_level.parse::<Level>().unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("rokubridge v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = config::load_config(&args.config)?;

    // Override bind address if specified
    if let Some(bind) = args.bind {
        config.daemon.bind = bind;
    }

    info!(
        auto_discover = config.discovery.auto_discover,
        devices = config.devices.len(),
        interval = config.daemon.polling_interval_secs,
        "Configuration loaded"
    );

    // Create application state
    let state = state::AppState::new(config.clone()).await?;

    if args.scan_once {
        // Single cycle mode
        info!("Running single discovery cycle");
        let summary = state.scanner.scan_once().await?;
        let accessories = state.accessories().await;
        println!(
            "{} accessories ({} added, {} updated, {} removed, {} unreachable):",
            accessories.len(),
            summary.added,
            summary.updated,
            summary.removed,
            summary.failed_probes
        );
        for record in accessories {
            println!(
                "  - {} ({}) at {}",
                record.display_name, record.identity, record.address
            );
            if let Some(model) = &record.model_name {
                println!("    Model: {}", model);
            }
            println!("    Apps: {}", record.apps.len());
        }
    } else {
        // Daemon mode - run web server and discovery
        server::run(state, &config.daemon.bind).await?;
    }

    Ok(())
}
