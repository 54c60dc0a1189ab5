//! burrowkv Server Binary
//!
//! Starts the TCP server for burrowkv.

use std::sync::Arc;

use burrowkv::network::Server;
use burrowkv::{Config, Engine};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

/// burrowkv Server
#[derive(Parser, Debug)]
#[command(name = "burrowkv-server")]
#[command(about = "Embedded hash-indexed key-value store over TCP")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./burrowkv_data")]
    data_dir: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:7070")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Requests executed side by side within one drain pass
    #[arg(short = 'c', long, default_value = "8")]
    drain_concurrency: usize,

    /// Rewrite both record logs without dead entries before serving
    #[arg(long)]
    compact: bool,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,burrowkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("burrowkv Server v{}", burrowkv::VERSION);
    tracing::info!("Data directory: {}", args.data_dir);
    tracing::info!("Listen address: {}", args.listen);

    // Build config from args
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .drain_concurrency(args.drain_concurrency)
        .compact_on_open(args.compact)
        .build();

    // Open engine
    let engine = match Engine::open(config.clone()) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Engine initialized successfully");

    // Start server
    let mut server = Server::new(config, Arc::clone(&engine));
    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = engine.close().wait() {
        tracing::error!("Engine close failed: {}", e);
    }
    tracing::info!("Server stopped");
}
