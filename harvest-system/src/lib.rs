//! Foundational system components for Harvest's services.
//!
//! Every long running part of the daemon (poller, discovery, sink workers, cache persistence,
//! control API) is a [`Service`] started through a [`ServiceRunner`]. Services observe the
//! process-wide [`Controller`] to leave their loops on shutdown.
#![warn(missing_docs)]

mod controller;
mod runtime;
mod service;
mod statsd;

pub use self::controller::*;
pub use self::runtime::*;
pub use self::service::*;
