//! QuillKV Server Binary
//!
//! Starts the TCP server and drains it on Ctrl+C / SIGTERM.

use std::path::PathBuf;

use clap::Parser;
use quillkv::config::{DEFAULT_DATA_DIR, DEFAULT_PORT, DEFAULT_WORKERS};
use quillkv::{Config, Server};
use tracing_subscriber::{fmt, EnvFilter};

/// QuillKV Server
#[derive(Parser, Debug)]
#[command(name = "quillkv-server")]
#[command(about = "Networked key-value store with a single-writer mutation path")]
#[command(version)]
struct Args {
    /// Number of connection worker threads
    #[arg(short = 't', long = "threads", default_value_t = DEFAULT_WORKERS)]
    threads: usize,

    /// Listening port number
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Path to the database directory
    #[arg(short = 'f', long = "path", default_value = DEFAULT_DATA_DIR)]
    path: PathBuf,

    /// Debug mode: more verbose logging
    #[arg(short, long)]
    debug: bool,
}

fn main() {
    let args = Args::parse();

    // Initialize tracing/logging
    let default_filter = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    tracing::info!("QuillKV Server v{}", quillkv::VERSION);
    tracing::debug!(
        "Configuration: threads={} port={} path={}",
        args.threads,
        args.port,
        args.path.display()
    );

    // Build config from args
    let config = Config::builder()
        .data_dir(&args.path)
        .port(args.port)
        .workers(args.threads)
        .build();

    let server = match Server::open(config) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(e.exit_code());
        }
    };

    // The handler only raises the signal; the server drains on its own threads.
    let shutdown = server.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::info!("Stop signal received, initiating shutdown...");
        shutdown.trigger();
    }) {
        tracing::warn!("Unable to install signal handler: {}", e);
    }

    let running = match server.start() {
        Ok(running) => running,
        Err(e) => {
            tracing::error!("Aborting: {}", e);
            std::process::exit(e.exit_code());
        }
    };

    if let Err(e) = running.wait() {
        tracing::error!("Shutdown error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
