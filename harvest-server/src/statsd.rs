use harvest_statsd::{CounterMetric, GaugeMetric, TimerMetric};

/// Gauge metrics used by the Harvest daemon.
pub enum ServerGauges {
    /// Number of raw samples waiting in the intake queue.
    ///
    /// Reported by the sink workers after each drain.
    QueueSize,
    /// Number of endpoints adopted by the last successful registry discovery.
    DiscoveredHosts,
    /// Number of series held by the composer cache after eviction.
    CacheEntries,
}

impl GaugeMetric for ServerGauges {
    fn name(&self) -> &'static str {
        match self {
            Self::QueueSize => "queue.size",
            Self::DiscoveredHosts => "eureka.hosts",
            Self::CacheEntries => "cache.entries",
        }
    }
}

/// The sink a write metric refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkKind {
    /// The bulk indexing sink.
    Elasticsearch,
    /// The rolling file sink.
    File,
}

/// Counter metrics used by the Harvest daemon.
pub enum ServerCounters {
    /// Number of endpoints fetched successfully.
    ///
    /// This metric is tagged with:
    ///  - `host`: The `host:port` of the endpoint.
    FetchOk,
    /// Number of endpoint fetches that failed with a transport error, a timeout or a status
    /// outside of 2xx.
    ///
    /// Tagged like [`Self::FetchOk`].
    FetchError,
    /// Number of raw samples admitted to the intake queue.
    SamplesEnqueued,
    /// Number of raw samples dropped because their name is excluded.
    SamplesExcluded,
    /// Incremented every time admission to a full intake queue took longer than the warning
    /// interval.
    AdmissionStalled,
    /// Successful writes. For the file sink this counts metric lines, for the indexing sink bulk
    /// requests.
    WriteOk(SinkKind),
    /// Failed writes. A bulk request is only counted once all attempts failed.
    WriteError(SinkKind),
    /// Number of composer cache snapshots that could not be written.
    CacheSnapshotError,
    /// Number of times the control API has been started.
    ServerStarting,
}

impl CounterMetric for ServerCounters {
    fn name(&self) -> &'static str {
        match self {
            Self::FetchOk => "beat.ok.count",
            Self::FetchError => "beat.error.count",
            Self::SamplesEnqueued => "in.queue.count",
            Self::SamplesExcluded => "beat.excluded.count",
            Self::AdmissionStalled => "queue.stalled.count",
            Self::WriteOk(SinkKind::Elasticsearch) => "elasticsearch.write.ok.count",
            Self::WriteOk(SinkKind::File) => "file.write.ok.count",
            Self::WriteError(SinkKind::Elasticsearch) => "elasticsearch.write.error.count",
            Self::WriteError(SinkKind::File) => "file.write.error.count",
            Self::CacheSnapshotError => "cache.snapshot.error.count",
            Self::ServerStarting => "server.starting",
        }
    }
}

/// Timer metrics used by the Harvest daemon.
pub enum ServerTimers {
    /// Time to fetch one endpoint, including reading the body.
    ///
    /// This metric is tagged with:
    ///  - `host`: The `host:port` of the endpoint.
    FetchDuration,
    /// Time to deliver one batch to the indexing store, including all retries.
    ElasticsearchWrite,
    /// Time to query the service registry.
    DiscoveryRefresh,
}

impl TimerMetric for ServerTimers {
    fn name(&self) -> &'static str {
        match self {
            Self::FetchDuration => "beat.time",
            Self::ElasticsearchWrite => "elasticsearch.write.time",
            Self::DiscoveryRefresh => "eureka.time",
        }
    }
}
