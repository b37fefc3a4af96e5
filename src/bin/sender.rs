//! # Sender Binary Entry Point
//!
//! Feeds values read from stdin (one integer per line) into a sender session.
//! Anything that produces numbers can be piped in, e.g. a hand tracker:
//!
//! ```bash
//! hand_tracker --no-gui | cargo run --bin sender -- --config config/sender.toml
//! ```
//!
//! Lines that are not integers are skipped; out-of-range values are clamped.
//! The session stops at end of input or on Ctrl-C.

use clap::Parser;
use log::{info, warn, LevelFilter};
use tokio::io::{AsyncBufReadExt, BufReader};

use led_relay::client::{SenderConfig, SenderSession};
use led_relay::common::config::load_config;
use led_relay::common::logging::init_logger;
use led_relay::Producer;

/// Command-line arguments for the sender binary
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the sender configuration file (TOML format)
    ///
    /// Example: config/sender.toml
    #[arg(short, long)]
    config: String,

    /// Override the client id from the config
    #[arg(long)]
    client_id: Option<String>,

    /// Override the recipient id from the config
    #[arg(long)]
    recipient: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logger(args.log_level);

    let mut config: SenderConfig = load_config(&args.config)?;
    if let Some(client_id) = args.client_id {
        config.sender.client_id = client_id;
    }
    if let Some(recipient) = args.recipient {
        config.sender.recipient_id = recipient;
    }

    let handle = SenderSession::spawn(config);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line? {
                Some(line) => match line.trim().parse::<i64>() {
                    Ok(value) => handle.submit(value),
                    Err(_) if line.trim().is_empty() => {}
                    Err(_) => warn!("⚠️  Skipping non-numeric input '{}'", line.trim()),
                },
                None => break,
            },
        }
    }

    info!(
        "🛑 Stopping sender ({} values still queued, {} evicted)",
        handle.queue().len(),
        handle.queue().evicted()
    );
    handle.stop();
    handle.join().await;
    Ok(())
}
