use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Local, Utc};
use indexmap::IndexMap;

use crate::statsd::MetricCounters;
use crate::{ComposerCache, MetricKind, OutputMetric, RawSample, SampleValue};

/// Format of [`OutputMetric::timestamp`], e.g. `2020-01-01T10:00:00.000+0800`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

/// Formats a scrape instant for output.
///
/// Uses the given offset, or the local offset at that instant if there is none.
pub fn format_timestamp(timestamp: DateTime<Utc>, offset: Option<FixedOffset>) -> String {
    match offset {
        Some(offset) => timestamp
            .with_timezone(&offset)
            .format(TIMESTAMP_FORMAT)
            .to_string(),
        None => timestamp
            .with_timezone(&Local)
            .format(TIMESTAMP_FORMAT)
            .to_string(),
    }
}

/// Turns raw samples into output metrics.
///
/// Gauges, histograms and untyped samples pass through. Counters are emitted as the increase
/// since the previous observation of the same series. Summaries are split into `<name>_count`,
/// `<name>_sum` and the average `<name>`, each computed over the increase since the previous
/// observation.
///
/// When a series is seen for the first time, or its value went backwards because the service
/// restarted, the raw value is emitted instead of a delta.
#[derive(Debug)]
pub struct Composer {
    cache: Arc<ComposerCache>,
    offset: Option<FixedOffset>,
}

impl Composer {
    /// Creates a composer that formats timestamps in the local offset.
    pub fn new(cache: Arc<ComposerCache>) -> Self {
        Self {
            cache,
            offset: None,
        }
    }

    /// Formats timestamps in a fixed offset instead of the local one.
    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns the cache holding the previous observations.
    pub fn cache(&self) -> &Arc<ComposerCache> {
        &self.cache
    }

    /// Composes one raw sample into zero or more output metrics.
    ///
    /// Counters and summaries replace their series' entry in the cache.
    pub fn compose(&self, sample: RawSample) -> Vec<OutputMetric> {
        let mut tags = IndexMap::with_capacity(sample.tags.len() + 2);
        tags.insert("host".to_owned(), sample.host.clone());
        tags.insert("port".to_owned(), sample.port.to_string());
        for (key, value) in &sample.tags {
            tags.insert(key.clone(), value.clone());
        }

        let timestamp = format_timestamp(sample.timestamp, self.offset);
        let output = |metric: String, value: f64| OutputMetric {
            metric,
            tags: tags.clone(),
            timestamp: timestamp.clone(),
            value,
        };

        match sample.value {
            SampleValue::Gauge(value)
            | SampleValue::Histogram(value)
            | SampleValue::Untyped(value) => vec![output(sample.name, value)],
            SampleValue::Counter(value) => {
                let name = sample.name.clone();
                let delta = match self.cache.swap(sample).map(|previous| previous.value) {
                    Some(SampleValue::Counter(old)) if old <= value => value - old,
                    Some(SampleValue::Counter(_)) => {
                        count_reset(MetricKind::Counter);
                        value
                    }
                    _ => value,
                };

                vec![output(name, delta)]
            }
            SampleValue::Summary { count, sum } => {
                let name = sample.name.clone();
                let (count, sum) = match self.cache.swap(sample).map(|previous| previous.value) {
                    Some(SampleValue::Summary {
                        count: old_count,
                        sum: old_sum,
                    }) if old_count <= count => (count - old_count, sum - old_sum),
                    Some(SampleValue::Summary { .. }) => {
                        count_reset(MetricKind::Summary);
                        (count, sum)
                    }
                    _ => (count, sum),
                };

                let rate = if count != 0.0 { sum / count } else { 0.0 };

                vec![
                    output(format!("{name}_count"), count),
                    output(format!("{name}_sum"), sum),
                    output(name, rate),
                ]
            }
        }
    }
}

fn count_reset(kind: MetricKind) {
    harvest_statsd::metric!(
        counter(MetricCounters::CounterReset) += 1,
        kind = kind.as_str()
    );
}
