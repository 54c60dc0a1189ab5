//! burrowkv CLI Client
//!
//! Command-line interface for interacting with a burrowkv server.

use burrowkv::network::Client;
use burrowkv::Value;
use clap::{Parser, Subcommand};

/// burrowkv CLI
#[derive(Parser, Debug)]
#[command(name = "burrowkv-cli")]
#[command(about = "CLI for the burrowkv key-value store")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:7070")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get the values of one or more keys
    Get {
        /// Keys to look up
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Store a string value under one or more keys
    Put {
        /// The value to store
        value: String,

        /// Keys to store it under
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Delete one or more keys
    Del {
        /// Keys to delete
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Ping the server
    Ping,
}

fn main() {
    let args = Args::parse();

    let mut client = match Client::connect(&args.server) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Could not connect to {}: {}", args.server, e);
            std::process::exit(1);
        }
    };

    let result = match args.command {
        Commands::Get { keys } => client.fetch(keys).map(|pairs| {
            if pairs.is_empty() {
                println!("(not found)");
            }
            for (key, value) in pairs {
                println!("{} = {}", key, value);
            }
        }),
        Commands::Put { value, keys } => client.put(keys, Value::String(value)).map(|_| println!("OK")),
        Commands::Del { keys } => client.del(keys).map(|_| println!("OK")),
        Commands::Ping => client.ping().map(|_| println!("PONG")),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
