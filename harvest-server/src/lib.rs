//! The Harvest daemon.
//!
//! This crate contains the [`run`] function which starts all services of the daemon and blocks
//! until shutdown.
//!
//! # Path of a sample through Harvest
//!
//! ```text
//! endpoint --(poller)--> parser --> IntakeQueue --(sink worker)--> Composer --> sinks
//!                                                                     |
//!                                                           ComposerCache <--> snapshot file
//! ```
//!
//! 1. The poller scrapes every static and discovered endpoint once per period. The parser is
//!    chosen by the URL path from the [`ParserRegistry`](harvest_metrics::ParserRegistry).
//! 2. Samples named in the exclusion list are dropped. All other samples are stamped with the
//!    endpoint's host, port and scrape time and admitted to the [`IntakeQueue`]. The poller
//!    waits while the queue is full.
//! 3. Sink workers drain the queue in batches. Every sample is composed once: counters become
//!    deltas against the cached previous sample, summaries become count, sum and rate.
//! 4. The composed batch is handed to every enabled sink. Failures are logged and counted.
//!
//! The composer cache is snapshotted to disk periodically and on shutdown and restored on
//! startup, so that deltas continue across restarts.
//!
//! See the [`Config`] documentation for more information on configuration options.
#![warn(missing_docs)]

use std::sync::Arc;

use anyhow::Context;
use harvest_config::Config;
use harvest_system::{Controller, ServiceRunner};

pub mod endpoints;
mod queue;
mod service;
mod services;
mod statsd;
mod targets;

pub use self::queue::*;
pub use self::service::*;
pub use self::services::*;
pub use self::targets::*;

/// Runs the daemon until a shutdown signal is received.
///
/// Creates a multi-thread runtime, starts all services and the control API, and waits until
/// every service has terminated.
pub fn run(config: Config) -> anyhow::Result<()> {
    let config = Arc::new(config);
    harvest_log::info!("harvest starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("harvest-rt")
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(async {
        Controller::start(config.shutdown_timeout());

        let mut runner = ServiceRunner::new();
        let state = ServiceState::start(config.clone(), &mut runner)?;
        runner.start(HttpServer::new(config, state)?);

        runner.join().await;
        Ok::<(), anyhow::Error>(())
    })?;

    harvest_log::info!("harvest shutdown complete");
    Ok(())
}
