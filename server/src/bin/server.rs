//! BlinkDB server binary.

use cache_core::Store;
use clap::Parser;
use server::config::Config;
use server::{logging, reactor, signal};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "blinkdb-server")]
#[command(about = "Bounded-memory key-value store with spill-to-disk")]
struct Args {
    /// Run the TCP server
    #[arg(long)]
    server: bool,

    /// Path to configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn main() {
    let args = Args::parse();

    if args.print_config {
        print_default_config();
        return;
    }

    if !args.server {
        eprintln!("Usage: blinkdb-server --server [--config <path>]");
        eprintln!("Run the server and use a Redis client against port 9001.");
        return;
    }

    let config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config: {}", e);
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    logging::init(&config.logging);

    if let Err(e) = run(config) {
        error!(error = %e, "server error");
        std::process::exit(1);
    }
}

fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::builder()
        .hot_capacity(config.cache.hot_capacity)
        .warm_capacity(config.cache.warm_capacity)
        .promotion_threshold(config.cache.promotion_threshold)
        .data_dir(&config.disk.data_dir)
        .build()?;

    info!(
        hot = config.cache.hot_capacity,
        warm = config.cache.warm_capacity,
        threshold = config.cache.promotion_threshold,
        data_dir = %config.disk.data_dir.display(),
        "store ready"
    );

    let shutdown = signal::install_signal_handler();
    reactor::run(&config, store, shutdown)?;

    info!("shutdown complete");
    Ok(())
}

fn print_default_config() {
    let config = r#"# BlinkDB Server Configuration

[server]
# Address to listen on
address = "0.0.0.0:9001"

# Listen backlog
backlog = 10000

# Per-connection input buffer cap; connections exceeding it are dropped
max_request_size = "513MB"

[cache]
# Entry capacity of the hot (L1) tier
hot_capacity = 10000

# Entry capacity of the warm (L2) tier
warm_capacity = 50000

# Accesses after which a warm entry promotes to hot
promotion_threshold = 3

[disk]
# Root directory for demoted values and the index file
data_dir = "./blinkdb_data"

[logging]
# Log level: "trace", "debug", "info", "warn", "error" (RUST_LOG overrides)
level = "info"

# Output format: "pretty", "json", or "compact"
format = "pretty"

# Include timestamps
timestamps = true
"#;
    print!("{}", config);
}
