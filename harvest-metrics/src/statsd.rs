use harvest_statsd::CounterMetric;

/// Counter metrics for Harvest Metrics.
pub enum MetricCounters {
    /// Incremented for every body or line a parser could not read.
    ///
    /// This metric is tagged with:
    ///  - `format`: The endpoint format, for instance `exposition`.
    ParserMalformed,

    /// Incremented every time a counter or summary went backwards, usually because the
    /// instrumented service restarted.
    ///
    /// This metric is tagged with:
    ///  - `kind`: `counter` or `summary`.
    CounterReset,

    /// Number of composer cache entries removed because they were not updated within the
    /// retention period.
    CacheEvicted,
}

impl CounterMetric for MetricCounters {
    fn name(&self) -> &'static str {
        match *self {
            Self::ParserMalformed => "parser.malformed.count",
            Self::CounterReset => "composer.counter_reset.count",
            Self::CacheEvicted => "cache.evicted.count",
        }
    }
}
