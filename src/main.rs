//! Vigil - proximity alerts for disaster and hazard events.
//!
//! Vigil watches a hazard event feed (wildfires, storms, floods...) and
//! alerts subscribers located near an event, at most once per event and
//! channel.
//!
//! # Overview
//!
//! Events arrive two ways:
//!
//! - **Poll**: the full snapshot of an EONET-compatible feed is fetched every
//!   `polling_interval` seconds and dispatched with the poll policy
//!   (500 km, SMS by default)
//! - **Push**: events written to standard input as JSON lines are dispatched
//!   immediately with the push policy (50 km, broadcast by default)
//!
//! Broadcast alerts are written to standard output as JSON lines, for a
//! socket server to forward to connected clients.
//!
//! # Configuration
//!
//! ```yaml
//! feed:
//!   url: "https://eonet.gsfc.nasa.gov/api/v3/events"
//!   polling_interval: 900
//!
//! registry:
//!   url: "https://accounts.example.com/api/subscribers"
//!
//! sms:
//!   url: "https://api.twilio.com"
//!   account_sid: "AC0123"
//!   auth_token: "secret"
//!   from: "+15550000000"
//! ```
//!
//! Any value can be overridden with a `VIGIL_` environment variable:
//!
//! ```bash
//! export VIGIL_SMS__AUTH_TOKEN="secret-from-env"
//! ```
//!
//! # Usage
//!
//! ```bash
//! vigil --config config.yaml --data ./vigil-data
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - Controls logging level (default: `info`)

use clap::Parser;
use env_logger::Env;
use log::{error, info};

use crate::{config::Config, engine::Engine};

mod alerts;
mod channels;
mod config;
mod engine;
mod error;
mod events;
mod feed;
mod geo;
mod live;
mod scheduler;
mod subscribers;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: String,

    /// Path to the directory for storing persistent data.
    ///
    /// Holds the `cooldowns` file, so subscribers are not alerted again
    /// about the same events after a restart.
    #[arg(short, long)]
    data: String,
}

#[tokio::main]
async fn main() {
    // Put logger at info level by default
    let env = Env::default().filter_or("RUST_LOG", "info");
    env_logger::init_from_env(env);

    info!("Starting vigil {}...", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load config file: {}", e);
            return;
        }
    };

    let engine = match Engine::new(config, &args.data).await {
        Ok(engine) => engine,
        Err(e) => {
            error!("Failed to initialize engine: {:#}", e);
            return;
        }
    };

    if let Err(e) = engine.start().await {
        error!("Engine stopped: {:#}", e);
    }
}
