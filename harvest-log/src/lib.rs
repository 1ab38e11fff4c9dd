//! Logging for Harvest.
//!
//! # Setup
//!
//! To enable logging, invoke the [`init`] function with a [`LogConfig`]. The configuration
//! implements `serde` traits, so it can be obtained from configuration files.
//!
//! ```ignore
//! let log_config = harvest_log::LogConfig {
//!     enable_backtraces: true,
//!     ..Default::default()
//! };
//!
//! harvest_log::init(&log_config);
//! ```
//!
//! # Logging
//!
//! The basic use of the log crate is through the five logging macros: [`error!`], [`warn!`],
//! [`info!`], [`debug!`] and [`trace!`] where `error!` represents the highest-priority log
//! messages and `trace!` the lowest. The log messages are filtered by configuring the log level to
//! exclude messages with a lower priority.
//!
//! Log messages start lowercase and do not end with a period. Where possible, data is passed as
//! structured fields rather than interpolated into the message:
//!
//! ```
//! # let host = "http://localhost:8080/metrics";
//! harvest_log::info!(host, "fetched endpoint");
//! ```
//!
//! # Logging Error Types
//!
//! To log errors to the console, pass them as a field. The [`LogError`] wrapper renders the
//! full chain of causes when an error needs to be formatted into a message:
//!
//! ```
//! use harvest_log::LogError;
//!
//! if let Err(error) = std::env::var("FOO") {
//!     harvest_log::error!("env failed: {}", LogError(&error));
//! }
//! ```
//!
//! # Testing
//!
//! For unit testing, there is a separate initialization macro [`init_test!`] that should be
//! called at the beginning of each test. It enables verbose logging of the calling crate and
//! routes the output into the test harness' capture.
//!
//! ```ignore
//! #[test]
//! fn test_something() {
//!     harvest_log::init_test!();
//! }
//! ```

#![warn(missing_docs)]

#[cfg(feature = "init")]
mod setup;
#[cfg(feature = "init")]
pub use setup::*;

#[cfg(feature = "test")]
mod test;
#[cfg(feature = "test")]
pub use test::*;

mod utils;
pub use utils::*;

pub use tracing::{debug, error, info, trace, warn};
