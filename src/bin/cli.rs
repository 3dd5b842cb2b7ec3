//! QuillKV CLI Client
//!
//! Command-line interface for interacting with QuillKV.

use std::io::Write;

use clap::{Parser, Subcommand};
use quillkv::protocol::{RequestOptions, ResponseCode};
use quillkv::Client;

/// QuillKV CLI
#[derive(Parser, Debug)]
#[command(name = "quillkv-cli")]
#[command(about = "CLI for the QuillKV key-value store")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:7077")]
    server: String,

    /// Database name (default database when omitted)
    #[arg(long)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,

        /// Wait until the write is durable
        #[arg(long)]
        sync: bool,

        /// Mark the write for replication
        #[arg(long)]
        replicate: bool,

        /// Flag the value as compressed
        #[arg(long)]
        compressed: bool,
    },
}

fn main() {
    let args = Args::parse();
    let client = Client::new(args.server);

    let result = match args.command {
        Commands::Get { key } => match &args.db {
            Some(db) => client.get_from(db, key),
            None => client.get(key),
        },
        Commands::Put {
            key,
            value,
            sync,
            replicate,
            compressed,
        } => {
            let options = RequestOptions::default()
                .sync(sync)
                .replication(replicate)
                .compress(compressed);
            client.put_with(args.db.as_deref(), key, value, options)
        }
    };

    let response = match result {
        Ok(response) => response,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };

    match response.code {
        ResponseCode::Ok => {
            if let Some(value) = response.value {
                let mut stdout = std::io::stdout();
                let _ = stdout.write_all(&value);
                let _ = stdout.write_all(b"\n");
            } else {
                println!("OK");
            }
        }
        ResponseCode::NoData => println!("(no data)"),
        code => {
            eprintln!("server responded {:?}", code);
            std::process::exit(1);
        }
    }
}
