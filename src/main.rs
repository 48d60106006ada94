// (C) Coralbits SL 2025
// This file is part of Cachelink and is licensed under the
// GNU Affero General Public License v3.0.
// A commercial license on request is also available;
// contact info@coralbits.com for details.

use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::debug;

use cachelink::{init_cache, setup_logging, Config};

#[derive(Parser, Debug)]
#[command(name = "cachelink", version, about = "Talk to a remote key-value cache")]
struct Args {
    /// YAML configuration file. Environment variables override it.
    #[arg(short, long, env = "CACHELINK_CONFIG")]
    config: Option<String>,

    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print whether the connection is alive, exit 1 if it is not
    Alive,
    /// Print the value of a key, or (nil)
    Get { key: String },
    /// Store a value with an expiry
    Set {
        key: String,
        value: String,
        #[arg(short, long, default_value_t = 60)]
        ttl: u64,
    },
    /// Remove a key
    Del { key: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::read(path)?,
        None => Config::empty(),
    };
    config
        .cache
        .apply_env()
        .context("Invalid cache environment")?;

    setup_logging(args.debug || config.debug)?;
    debug!("Using cache backend={:?}", config.cache.backend);

    let cache = init_cache(&config.cache)?;
    // Let the connection settle before looking at it
    cache.sync().await;

    match args.command {
        Command::Alive => {
            let alive = cache.is_alive();
            println!("{}", alive);
            if !alive {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Get { key } => match cache.get(&key).await? {
            Some(value) => println!("{}", value),
            None => println!("(nil)"),
        },
        Command::Set { key, value, ttl } => {
            cache.set(&key, &value, ttl);
            cache.sync().await;
        }
        Command::Del { key } => {
            cache.delete(&key);
            cache.sync().await;
        }
    }
    Ok(ExitCode::SUCCESS)
}
