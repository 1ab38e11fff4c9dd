//! Parsers for the body formats served by instrumented services.
//!
//! Every parser turns a complete body into [`RawSample`]s without origin or timestamp. Parsers
//! never fail: unreadable input is logged, counted as `parser.malformed.count` and skipped.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::RawSample;
use crate::statsd::MetricCounters;

mod exposition;
mod flat_json;
mod nested_json;

pub use self::exposition::parse_exposition;
pub use self::flat_json::parse_flat_json;
pub use self::nested_json::parse_nested_json;

/// The wire format served at an endpoint path.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointFormat {
    /// The line-oriented text exposition format with `# HELP` and `# TYPE` headers.
    Exposition,
    /// A single JSON object mapping metric names to numbers.
    FlatJson,
    /// Arbitrarily nested JSON objects with optional `type` annotations.
    NestedJson,
}

impl EndpointFormat {
    /// Parses a body in this format.
    pub fn parse(&self, body: &str) -> Vec<RawSample> {
        match self {
            Self::Exposition => parse_exposition(body),
            Self::FlatJson => parse_flat_json(body),
            Self::NestedJson => parse_nested_json(body),
        }
    }

    /// Returns the snake case name of this format.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exposition => "exposition",
            Self::FlatJson => "flat_json",
            Self::NestedJson => "nested_json",
        }
    }
}

impl fmt::Display for EndpointFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn count_malformed(format: EndpointFormat) {
    harvest_statsd::metric!(
        counter(MetricCounters::ParserMalformed) += 1,
        format = format.as_str()
    );
}
