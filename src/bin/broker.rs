//! # Broker Binary Entry Point
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin broker -- --config config/broker.toml
//! ```
//!
//! The broker will:
//! 1. Load configuration from the specified TOML file
//! 2. Open the LED device (or fall back to simulation) and switch all LEDs off
//! 3. Accept clients, relay their messages and act on `LED@` commands
//! 4. Stop accepting on Ctrl-C

use clap::Parser;
use log::{info, LevelFilter};

use led_relay::common::config::load_config;
use led_relay::common::logging::init_logger;
use led_relay::server::{Broker, BrokerConfig};

/// Command-line arguments for the broker binary
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the broker configuration file (TOML format)
    ///
    /// Example: config/broker.toml
    #[arg(short, long)]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logger(args.log_level);

    let config: BrokerConfig = load_config(&args.config)?;
    let broker = Broker::new(config);

    broker
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("👋 Broker shut down");
    Ok(())
}
