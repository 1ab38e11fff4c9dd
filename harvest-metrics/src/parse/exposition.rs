use std::collections::BTreeMap;

use crate::parse::{EndpointFormat, count_malformed};
use crate::{MetricKind, RawSample, SampleValue};

const HELP_MARKER: &str = "# HELP ";
const TYPE_MARKER: &str = "# TYPE ";

/// A `# HELP` header with the lines that follow it.
#[derive(Debug)]
struct Block<'a> {
    help_name: &'a str,
    type_name: Option<&'a str>,
    kind: MetricKind,
    lines: Vec<&'a str>,
}

impl<'a> Block<'a> {
    fn new(help_name: &'a str) -> Self {
        Self {
            help_name,
            type_name: None,
            kind: MetricKind::Untyped,
            lines: Vec::new(),
        }
    }

    fn name(&self) -> &'a str {
        self.type_name.unwrap_or(self.help_name)
    }

    fn collect_into(self, samples: &mut Vec<RawSample>) {
        let name = self.name();

        if self.kind == MetricKind::Summary {
            // count line followed by sum line, a trailing odd line has no partner
            for pair in self.lines.chunks_exact(2) {
                let (Some(count), Some(sum)) = (parse_value(pair[0]), parse_value(pair[1])) else {
                    count_malformed(EndpointFormat::Exposition);
                    continue;
                };

                let value = SampleValue::Summary { count, sum };
                samples.push(RawSample::new(name, parse_tags(pair[0]), value));
            }
            return;
        }

        for line in self.lines {
            let Some(value) = parse_value(line) else {
                harvest_log::trace!(line, "skipping malformed exposition line");
                count_malformed(EndpointFormat::Exposition);
                continue;
            };

            let value = SampleValue::single(self.kind, value);
            samples.push(RawSample::new(name, parse_tags(line), value));
        }
    }
}

/// Returns the first whitespace separated token after a header marker.
fn header_name(rest: &str) -> &str {
    rest.split_whitespace().next().unwrap_or_default()
}

/// Parses the value after the last space of a line.
fn parse_value(line: &str) -> Option<f64> {
    let (_, value) = line.trim().rsplit_once(' ')?;
    value.parse().ok()
}

/// Parses the `key="value"` pairs between the first `{` and the following `}`.
fn parse_tags(line: &str) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();

    let Some((_, rest)) = line.split_once('{') else {
        return tags;
    };
    let Some((inner, _)) = rest.split_once('}') else {
        return tags;
    };

    for pair in inner.split(',') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };

        let key = key.trim();
        let value = value.replace('"', "");
        if key.is_empty() || value.is_empty() {
            continue;
        }

        tags.insert(key.to_owned(), value);
    }

    tags
}

/// Parses the line-oriented text exposition format.
///
/// Lines are grouped into blocks starting at every `# HELP` header. All samples of a block are
/// named after the block's `# TYPE` line, or the `# HELP` line if there is none, and carry the
/// declared kind. Summary blocks consume two value lines per sample: the count, then the sum.
/// Anything before the first `# HELP` header is ignored.
pub fn parse_exposition(body: &str) -> Vec<RawSample> {
    let body = body.replace('\r', "");
    let mut samples = Vec::new();
    let mut block: Option<Block<'_>> = None;

    for line in body.split('\n') {
        if line.trim().is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix(HELP_MARKER) {
            if let Some(done) = block.replace(Block::new(header_name(rest))) {
                done.collect_into(&mut samples);
            }
            continue;
        }

        let Some(current) = block.as_mut() else {
            continue;
        };

        if let Some(rest) = line.strip_prefix(TYPE_MARKER) {
            let mut parts = rest.split_whitespace();
            current.type_name = parts.next();
            current.kind = parts.next().map_or(MetricKind::Untyped, MetricKind::from_name);
        } else if !line.starts_with('#') {
            current.lines.push(line);
        }
    }

    if let Some(done) = block {
        done.collect_into(&mut samples);
    }

    samples
}

#[cfg(test)]
mod tests {
    use insta::assert_debug_snapshot;

    use super::*;

    fn summarize(samples: &[RawSample]) -> Vec<String> {
        samples
            .iter()
            .map(|s| format!("{} {:?} {:?}", s.name, s.tags, s.value))
            .collect()
    }

    #[test]
    fn test_blocks_and_kinds() {
        let body = "\
# HELP jvm_threads_live Current thread count
# TYPE jvm_threads_live gauge
jvm_threads_live 42.0
# HELP http_requests_total Total requests
# TYPE http_requests_total counter
http_requests_total{method=\"GET\",status=\"200\",} 1027.0
http_requests_total{method=\"POST\",status=\"500\",} 3.0
";

        assert_debug_snapshot!(summarize(&parse_exposition(body)), @r###"
        [
            "jvm_threads_live {} Gauge(42.0)",
            "http_requests_total {\"method\": \"GET\", \"status\": \"200\"} Counter(1027.0)",
            "http_requests_total {\"method\": \"POST\", \"status\": \"500\"} Counter(3.0)",
        ]
        "###);
    }

    #[test]
    fn test_summary_consumes_line_pairs() {
        let body = "\
# HELP rpc_seconds RPC latency
# TYPE rpc_seconds summary
rpc_seconds_count{service=\"a\"} 4
rpc_seconds_sum{service=\"a\"} 10
rpc_seconds_count{service=\"b\"} 2
rpc_seconds_sum{service=\"b\"} 1
rpc_seconds_count{service=\"c\"} 9
";

        assert_debug_snapshot!(summarize(&parse_exposition(body)), @r###"
        [
            "rpc_seconds {\"service\": \"a\"} Summary { count: 4.0, sum: 10.0 }",
            "rpc_seconds {\"service\": \"b\"} Summary { count: 2.0, sum: 1.0 }",
        ]
        "###);
    }

    #[test]
    fn test_samples_named_after_block() {
        let body = "\
# HELP bucket buckets
# TYPE bucket histogram
bucket_le{le=\"0.5\"} 1
bucket_le{le=\"+Inf\"} 3
";
        let samples = parse_exposition(body);
        assert_eq!(samples.len(), 2);
        assert!(samples.iter().all(|s| s.name == "bucket"));
        assert!(samples.iter().all(|s| s.kind() == MetricKind::Histogram));
        assert_eq!(samples[1].tags["le"], "+Inf");
    }

    #[test]
    fn test_missing_or_unknown_type() {
        let body = "\
# HELP first no type line
first 1
# HELP second unknown type
# TYPE second meter
second 2
# HELP third upper case
# TYPE third COUNTER
third 3
";
        let samples = parse_exposition(body);
        let kinds: Vec<_> = samples.iter().map(|s| (s.name.as_str(), s.kind())).collect();
        assert_eq!(
            kinds,
            [
                ("first", MetricKind::Untyped),
                ("second", MetricKind::Untyped),
                ("third", MetricKind::Counter),
            ]
        );
    }

    #[test]
    fn test_ignores_preamble_comments_and_blank_lines() {
        let body = "orphan 1\r\n# comment\r\n\r\n# HELP up up\r\n# TYPE up gauge\r\n# EOF note\r\n\r\nup 1\r\n";
        let samples = parse_exposition(body);
        assert_eq!(summarize(&samples), ["up {} Gauge(1.0)"]);
    }

    #[test]
    fn test_malformed_value_is_skipped() {
        let body = "# HELP up up\n# TYPE up gauge\nup{a=\"1\"} NOPE\nup{a=\"2\"} 2\n";
        let samples = parse_exposition(body);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].tags["a"], "2");
    }

    #[test]
    fn test_special_float_values() {
        let body = "# HELP g g\n# TYPE g gauge\ng{a=\"x\"} +Inf\ng{a=\"y\"} NaN\n";
        let samples = parse_exposition(body);
        assert_eq!(samples[0].value, SampleValue::Gauge(f64::INFINITY));
        assert!(samples[1].value.values().0.is_nan());
    }

    #[test]
    fn test_tag_edge_cases() {
        let tags = parse_tags("m{ a = \"1\" ,b=,=c,d=\"x=y\"} 1");
        assert_eq!(
            tags,
            BTreeMap::from([
                ("a".to_owned(), " 1 ".to_owned()),
                ("d".to_owned(), "x=y".to_owned()),
            ])
        );

        assert!(parse_tags("m 1").is_empty());
        assert!(parse_tags("m{a=\"1\" 1").is_empty());
    }

    #[test]
    fn test_counts_malformed_lines() {
        let captures = harvest_statsd::with_capturing_test_client(|| {
            parse_exposition("# HELP up up\nup x\n");
        });
        assert_eq!(captures, ["parser.malformed.count:1|c|#format:exposition"]);
    }
}
