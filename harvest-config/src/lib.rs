//! Configuration for the Harvest CLI and daemon.
//!
//! The configuration lives in a folder, by default `.harvest`, which contains a `config.yml`.
//! Every section and value is optional. See [`Config`] for the accessors that services use.
#![warn(missing_docs)]

mod config;

pub use crate::config::*;
