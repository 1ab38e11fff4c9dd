use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::parse::{EndpointFormat, count_malformed};
use crate::{MetricKind, RawSample, SampleValue};

/// Key of the kind annotation at an object level.
const TYPE_KEY: &str = "type";

fn join_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_owned()
    } else {
        format!("{path}.{key}")
    }
}

fn walk(object: &Map<String, Value>, path: &str, inherited: MetricKind, out: &mut Vec<RawSample>) {
    // the annotation applies to the whole level regardless of key order
    let kind = match object.get(TYPE_KEY) {
        Some(Value::String(name)) => MetricKind::from_name(name),
        _ => inherited,
    };

    for (key, value) in object {
        match value {
            Value::Object(child) => walk(child, &join_path(path, key), kind, out),
            Value::Number(number) => {
                let Some(number) = number.as_f64() else {
                    continue;
                };
                let value = SampleValue::single(kind, number);
                out.push(RawSample::new(join_path(path, key), BTreeMap::new(), value));
            }
            Value::String(_) | Value::Bool(_) | Value::Null | Value::Array(_) => {}
        }
    }
}

/// Parses arbitrarily nested JSON objects into dotted metric names.
///
/// A string `type` key declares the kind for its object level and everything below it. Levels
/// without an annotation inherit the kind of their parent, the root defaults to untyped. Only
/// numeric leaves produce samples.
pub fn parse_nested_json(body: &str) -> Vec<RawSample> {
    let root = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(root)) => root,
        Ok(_) => return Vec::new(),
        Err(error) => {
            harvest_log::warn!(
                error = &error as &dyn std::error::Error,
                "failed to parse nested json metrics"
            );
            count_malformed(EndpointFormat::NestedJson);
            return Vec::new();
        }
    };

    let mut samples = Vec::new();
    walk(&root, "", MetricKind::Untyped, &mut samples);
    samples
}
