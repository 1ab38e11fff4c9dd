//! The Harvest daemon scrapes metrics from application endpoints, turns counters into deltas
//! and ships the result to an indexing store or rolling files.
//!
//! # Usage
//!
//! ```text
//! harvest [--config DIR] run [--period SECS] [--listen ADDR] [--log-level LEVEL]
//!                            [--statsd ADDR] [--hosts URLS]
//! ```
//!
//! The config folder defaults to `.harvest` and contains an optional `config.yml`. All options
//! of `run` can also be set through `HARVEST_*` environment variables.

mod cli;
mod cliapp;
mod setup;

use std::process;

pub fn main() {
    let exit_code = match cli::execute() {
        Ok(()) => 0,
        Err(err) => {
            harvest_log::ensure_error(&err);
            1
        }
    };

    process::exit(exit_code);
}
