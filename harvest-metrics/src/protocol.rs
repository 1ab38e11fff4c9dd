use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The semantic kind of a sample, as declared by the instrumented service.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// A monotonically increasing total that may reset to zero on restart.
    Counter,
    /// A point-in-time value.
    Gauge,
    /// An observation count together with the sum of all observations.
    Summary,
    /// A histogram bucket, passed through as-is.
    Histogram,
    /// Anything else.
    Untyped,
}

impl MetricKind {
    /// Parses a kind name case-insensitively.
    ///
    /// Unknown names map to [`MetricKind::Untyped`], so this never fails.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "counter" => Self::Counter,
            "gauge" => Self::Gauge,
            "summary" => Self::Summary,
            "histogram" => Self::Histogram,
            _ => Self::Untyped,
        }
    }

    /// Returns the lowercase name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Summary => "summary",
            Self::Histogram => "histogram",
            Self::Untyped => "untyped",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The [typed value](RawSample::value) of a sample.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum SampleValue {
    /// A cumulative total. See [`MetricKind::Counter`].
    Counter(f64),
    /// See [`MetricKind::Gauge`].
    Gauge(f64),
    /// Cumulative observation count and sum. See [`MetricKind::Summary`].
    Summary {
        /// Number of observations.
        count: f64,
        /// Sum of all observed values.
        sum: f64,
    },
    /// See [`MetricKind::Histogram`].
    Histogram(f64),
    /// See [`MetricKind::Untyped`].
    Untyped(f64),
}

impl SampleValue {
    /// Creates a single-valued sample value of the given kind.
    ///
    /// A summary created this way has a sum of zero.
    pub fn single(kind: MetricKind, value: f64) -> Self {
        match kind {
            MetricKind::Counter => Self::Counter(value),
            MetricKind::Gauge => Self::Gauge(value),
            MetricKind::Summary => Self::Summary {
                count: value,
                sum: 0.0,
            },
            MetricKind::Histogram => Self::Histogram(value),
            MetricKind::Untyped => Self::Untyped(value),
        }
    }

    /// Returns the kind of this value.
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Gauge(_) => MetricKind::Gauge,
            Self::Summary { .. } => MetricKind::Summary,
            Self::Histogram(_) => MetricKind::Histogram,
            Self::Untyped(_) => MetricKind::Untyped,
        }
    }

    /// Returns the primary value and, for summaries, the secondary value (the sum).
    pub fn values(&self) -> (f64, Option<f64>) {
        match *self {
            Self::Counter(v) | Self::Gauge(v) | Self::Histogram(v) | Self::Untyped(v) => (v, None),
            Self::Summary { count, sum } => (count, Some(sum)),
        }
    }
}

/// One observation scraped from one endpoint at one instant.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct RawSample {
    /// Host of the scraped endpoint, empty until stamped by the poller.
    pub host: String,
    /// Port of the scraped endpoint, `0` until stamped by the poller.
    pub port: u16,
    /// The scrape instant with millisecond precision.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// The metric name.
    pub name: String,
    /// Tags in canonical order.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// The typed value.
    pub value: SampleValue,
}

impl RawSample {
    /// Creates a sample without origin and with an unset timestamp, as produced by parsers.
    pub fn new(name: impl Into<String>, tags: BTreeMap<String, String>, value: SampleValue) -> Self {
        Self {
            host: String::new(),
            port: 0,
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            name: name.into(),
            tags,
            value,
        }
    }

    /// Sets the origin and scrape instant of the sample.
    ///
    /// The timestamp is truncated to milliseconds.
    pub fn stamp(&mut self, host: &str, port: u16, timestamp: DateTime<Utc>) {
        host.clone_into(&mut self.host);
        self.port = port;
        self.timestamp = timestamp.trunc_subsecs(3);
    }

    /// Returns the kind of the sample's value.
    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }

    /// Returns the key identifying the series this sample belongs to.
    pub fn key(&self) -> SampleKey {
        SampleKey {
            host: self.host.clone(),
            port: self.port,
            name: self.name.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// Identity of a series: origin, name and tags.
///
/// The string form is `host|port|name|k1=v1,k2=v2` with tags in sorted order.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct SampleKey {
    /// See [`RawSample::host`].
    pub host: String,
    /// See [`RawSample::port`].
    pub port: u16,
    /// See [`RawSample::name`].
    pub name: String,
    /// See [`RawSample::tags`].
    pub tags: BTreeMap<String, String>,
}

impl fmt::Display for SampleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}|", self.host, self.port, self.name)?;
        for (index, (key, value)) in self.tags.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

/// A metric ready for delivery to a sink.
///
/// Serializes with the fields in the order `metric`, `tags`, `timestamp`, `value`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct OutputMetric {
    /// The metric name.
    pub metric: String,
    /// `host` and `port` first, followed by the sample tags in canonical order.
    pub tags: IndexMap<String, String>,
    /// The scrape instant formatted as `%Y-%m-%dT%H:%M:%S%.3f%z`.
    pub timestamp: String,
    /// The emitted value.
    pub value: f64,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_kind_from_name() {
        assert_eq!(MetricKind::from_name("COUNTER"), MetricKind::Counter);
        assert_eq!(MetricKind::from_name("Summary"), MetricKind::Summary);
        assert_eq!(MetricKind::from_name("gauge"), MetricKind::Gauge);
        assert_eq!(MetricKind::from_name("meter"), MetricKind::Untyped);
        assert_eq!(MetricKind::from_name(""), MetricKind::Untyped);
    }

    #[test]
    fn test_sample_key_display() {
        let mut sample = RawSample::new(
            "http_requests",
            BTreeMap::from([
                ("status".to_owned(), "200".to_owned()),
                ("method".to_owned(), "get".to_owned()),
            ]),
            SampleValue::Counter(1.0),
        );
        sample.stamp("app-1", 8080, Utc::now());

        assert_eq!(
            sample.key().to_string(),
            "app-1|8080|http_requests|method=get,status=200"
        );
    }

    #[test]
    fn test_sample_key_ignores_value_and_time() {
        let mut a = RawSample::new("up", BTreeMap::new(), SampleValue::Gauge(1.0));
        let mut b = RawSample::new("up", BTreeMap::new(), SampleValue::Gauge(0.0));
        a.stamp("h", 1, Utc.timestamp_opt(10, 0).unwrap());
        b.stamp("h", 1, Utc.timestamp_opt(20, 0).unwrap());
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_stamp_truncates_to_millis() {
        let mut sample = RawSample::new("up", BTreeMap::new(), SampleValue::Gauge(1.0));
        let instant = Utc.timestamp_opt(1, 123_456_789).unwrap();
        sample.stamp("h", 1, instant);
        assert_eq!(sample.timestamp.timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn test_raw_sample_serialization() {
        let mut sample = RawSample::new(
            "rpc",
            BTreeMap::from([("m".to_owned(), "x".to_owned())]),
            SampleValue::Summary {
                count: 4.0,
                sum: 10.0,
            },
        );
        sample.stamp("h", 9, Utc.timestamp_opt(1_577_844_000, 0).unwrap());

        let json = serde_json::to_string(&sample).unwrap();
        insta::assert_snapshot!(json, @r###"{"host":"h","port":9,"timestamp":1577844000000,"name":"rpc","tags":{"m":"x"},"value":{"kind":"summary","value":{"count":4.0,"sum":10.0}}}"###);

        let parsed: RawSample = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, sample);
    }

    #[test]
    fn test_output_metric_field_order() {
        let metric = OutputMetric {
            metric: "up".to_owned(),
            tags: IndexMap::from([
                ("host".to_owned(), "h".to_owned()),
                ("port".to_owned(), "1".to_owned()),
            ]),
            timestamp: "2020-01-01T10:00:00.000+0800".to_owned(),
            value: 1.0,
        };

        insta::assert_snapshot!(serde_json::to_string(&metric).unwrap(), @r###"{"metric":"up","tags":{"host":"h","port":"1"},"timestamp":"2020-01-01T10:00:00.000+0800","value":1.0}"###);
    }

    #[test]
    fn test_values_view() {
        assert_eq!(SampleValue::Gauge(3.0).values(), (3.0, None));
        assert_eq!(
            SampleValue::Summary { count: 2.0, sum: 5.0 }.values(),
            (2.0, Some(5.0))
        );
    }
}
