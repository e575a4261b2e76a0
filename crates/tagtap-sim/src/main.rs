//! # tagtap-sim
//!
//! Replays scripted tag taps through the tagtap dispatcher using in-memory tags.
//!
//! Display updates and legacy write results go to stdout as JSON lines; logs go to
//! stderr (and to rolling files in production mode).
//!
//! ## Running
//!
//! ```bash
//! # Replay the bundled script with the default configuration
//! cargo run --package tagtap-sim -- demos/scan.json
//!
//! # Use an explicit configuration file
//! cargo run --package tagtap-sim -- demos/scan.json tagtap.toml
//! ```
//!
//! ## Environment Variables
//!
//! - `TAGTAP_PRODUCTION`: `1` or `true` enables JSON file logging
//! - `TAGTAP_LOG_LEVEL`: fallback log filter when `RUST_LOG` is unset (default: info)
//! - `TAGTAP_<SECTION>__<KEY>`: configuration overrides, e.g. `TAGTAP_RECORD__TEXT`

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tagtap_core::{Config, TagtapError};
use tracing::info;

mod cli;
mod logging;
mod script;

const PRODUCTION_VAR: &str = "TAGTAP_PRODUCTION";

fn is_production() -> bool {
    std::env::var(PRODUCTION_VAR)
        .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true"))
        .unwrap_or(false)
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    // A missing file still picks up environment overrides.
    let path = path
        .or_else(Config::default_path)
        .unwrap_or_else(|| PathBuf::from("tagtap.toml"));
    info!(path = %path.display(), "Loading configuration");
    Ok(Config::load_or_default(&path).map_err(TagtapError::from)?)
}

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    logging::init(is_production())?;

    let config = load_config(args.config).context("Failed to load configuration")?;

    info!(script = %args.script.display(), "Starting tagtap-sim");

    let steps = script::load(&args.script)?;
    let mut replay = script::Replay::new(&config)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let summary = replay.run(steps, &mut out)?;

    info!(
        displayed = summary.displayed,
        ignored = summary.ignored,
        formatted = summary.formatted,
        failed = summary.failed,
        legacy_written = summary.legacy_written,
        last_tag_id = replay.last_tag_id().unwrap_or("-"),
        "Replay complete"
    );

    Ok(())
}
