//! # EMBER
//!
//! One million particles simulated by compute kernels and drawn straight
//! from the same device buffer.
//!
//! ```bash
//! cargo run --release -p ember
//! RUST_LOG=ember_core=debug cargo run --release -p ember
//! EMBER_CAPACITY=100000 EMBER_SPRITE_MODE=points cargo run --release -p ember
//! ```
//!
//! Settings come from `ember.toml` in the working directory when present.
//!
//! Keys: arrows move in the horizontal plane, `O`/`L` move up and down,
//! `I`/`K` tilt the camera, Escape quits.

#![deny(unsafe_code)]
#![warn(clippy::pedantic)]

mod app;
mod input;

use std::path::Path;
use std::process::ExitCode;

use ember_core::config::{SimulationConfig, CONFIG_FILE};
use ember_core::error::EmberResult;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    init_logging();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ember starting");

    match run() {
        Ok(()) => {
            tracing::info!("clean exit");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(%err, "ember failed");
            ExitCode::FAILURE
        }
    }
}

fn run() -> EmberResult<()> {
    let config = SimulationConfig::load_or_default(Path::new(CONFIG_FILE))?;
    app::run(&config)
}

/// `info` by default, `RUST_LOG` overrides.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
