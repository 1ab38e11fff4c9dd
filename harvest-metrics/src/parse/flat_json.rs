use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::parse::{EndpointFormat, count_malformed};
use crate::{RawSample, SampleValue};

/// Names with this prefix are reported as counters.
const COUNTER_PREFIX: &str = "counter.";

/// Parses a single JSON object mapping metric names to numbers.
///
/// Samples are returned in document order. Names starting with `counter.` become counters,
/// everything else is untyped. If any value is not a number the whole document is rejected.
pub fn parse_flat_json(body: &str) -> Vec<RawSample> {
    let values: IndexMap<String, f64> = match serde_json::from_str(body) {
        Ok(values) => values,
        Err(error) => {
            harvest_log::warn!(
                error = &error as &dyn std::error::Error,
                "failed to parse flat json metrics"
            );
            count_malformed(EndpointFormat::FlatJson);
            return Vec::new();
        }
    };

    values
        .into_iter()
        .map(|(name, value)| {
            let value = if name.starts_with(COUNTER_PREFIX) {
                SampleValue::Counter(value)
            } else {
                SampleValue::Untyped(value)
            };
            RawSample::new(name, BTreeMap::new(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_order_and_counter_prefix() {
        let body = r#"{"mem": 1024, "counter.status.200.root": 7, "gauge.response.root": 3.5}"#;
        let samples = parse_flat_json(body);

        let summary: Vec<_> = samples
            .iter()
            .map(|s| (s.name.as_str(), s.value))
            .collect();

        assert_eq!(
            summary,
            [
                ("mem", SampleValue::Untyped(1024.0)),
                ("counter.status.200.root", SampleValue::Counter(7.0)),
                ("gauge.response.root", SampleValue::Untyped(3.5)),
            ]
        );
        assert!(samples.iter().all(|s| s.tags.is_empty()));
    }

    #[test]
    fn test_non_numeric_value_rejects_document() {
        assert!(parse_flat_json(r#"{"mem": 1, "uptime": "3 days"}"#).is_empty());
    }

    #[test]
    fn test_invalid_documents() {
        harvest_log::init_test!();

        assert!(parse_flat_json("").is_empty());
        assert!(parse_flat_json("[1, 2]").is_empty());
        assert!(parse_flat_json("{\"a\": {\"b\": 1}}").is_empty());
    }

    #[test]
    fn test_empty_object() {
        assert!(parse_flat_json("{}").is_empty());
    }
}
