use harvest_statsd::CounterMetric;

/// Counter metrics for Harvest system components.
pub enum SystemCounters {
    /// Number of tasks created by [`spawn()`](crate::spawn).
    ///
    /// This metric is tagged with:
    ///  - `id`: The service name or the source location of the spawn.
    TaskCreated,
    /// Number of tasks spawned by [`spawn()`](crate::spawn) that completed, panicked or were
    /// aborted.
    ///
    /// Tagged like [`Self::TaskCreated`].
    TaskTerminated,
}

impl CounterMetric for SystemCounters {
    fn name(&self) -> &'static str {
        match *self {
            Self::TaskCreated => "runtime.task.created",
            Self::TaskTerminated => "runtime.task.terminated",
        }
    }
}
