//! Sample model and processing for Harvest.
//!
//! Scraped endpoint bodies are turned into [`RawSample`]s by one of the format parsers in
//! [`parse`]. Which parser applies to an endpoint is decided by the [`ParserRegistry`], an
//! ordered list of URL paths and their [`EndpointFormat`].
//!
//! Raw samples carry cumulative values as reported by the instrumented service. The
//! [`Composer`] turns them into [`OutputMetric`]s ready for a sink: counters become the delta
//! since the previous observation of the same series, summaries are split into count, sum and
//! rate. The previous observations live in the [`ComposerCache`], which can be snapshotted to
//! disk and restored across restarts.
//!
//! ```
//! use harvest_metrics::{Composer, ComposerCache, EndpointFormat};
//! use std::sync::Arc;
//!
//! let body = "# HELP requests total\n# TYPE requests counter\nrequests{path=\"/\"} 5\n";
//! let samples = EndpointFormat::Exposition.parse(body);
//!
//! let composer = Composer::new(Arc::new(ComposerCache::new()));
//! let metrics: Vec<_> = samples.into_iter().flat_map(|s| composer.compose(s)).collect();
//! assert_eq!(metrics[0].value, 5.0);
//! ```
#![warn(missing_docs)]

mod cache;
mod composer;
pub mod parse;
mod protocol;
mod registry;
mod statsd;

pub use self::cache::*;
pub use self::composer::*;
pub use self::parse::EndpointFormat;
pub use self::protocol::*;
pub use self::registry::*;
