//! Delivery of composed metrics.
//!
//! The [`SinkWorkerService`] drains raw samples from the intake queue, composes every sample
//! exactly once and hands the resulting batch to each enabled [`Sink`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use harvest_config::Config;
use harvest_metrics::{Composer, OutputMetric, RawSample};
use harvest_system::{Controller, Service};

use crate::queue::IntakeQueue;
use crate::statsd::ServerGauges;

mod elasticsearch;
mod file;

pub use self::elasticsearch::*;
pub use self::file::*;

/// Time a worker waits before polling an empty queue again.
const IDLE_INTERVAL: Duration = Duration::from_millis(500);

/// An error returned by [`Sink::deliver`].
///
/// The sink has logged and counted the failure by the time it is returned.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// Every attempt to deliver the batch failed.
    #[error("delivery failed after {0} attempts")]
    RetriesExhausted(u32),
    /// No target host is configured.
    #[error("no host configured")]
    NoHost,
    /// Writing to disk failed.
    #[error("failed to write metrics")]
    Io(#[from] std::io::Error),
    /// A metric could not be serialized.
    #[error("failed to serialize metrics")]
    Serialize(#[from] serde_json::Error),
    /// The blocking write task was cancelled or panicked.
    #[error("write task failed")]
    Task(#[from] tokio::task::JoinError),
}

/// A destination for composed metrics.
#[async_trait::async_trait]
pub trait Sink: fmt::Debug + Send + Sync {
    /// Returns the name of the sink for diagnostics.
    fn name(&self) -> &'static str;

    /// Delivers a batch of metrics.
    async fn deliver(&self, metrics: &[OutputMetric]) -> Result<(), DeliveryError>;
}

/// Composes a batch of raw samples and delivers the result to every sink.
///
/// A failing sink does not prevent delivery to the others.
pub async fn process_batch(composer: &Composer, sinks: &[Arc<dyn Sink>], batch: Vec<RawSample>) {
    let metrics: Vec<OutputMetric> = batch
        .into_iter()
        .flat_map(|sample| composer.compose(sample))
        .collect();

    if metrics.is_empty() {
        return;
    }

    for sink in sinks {
        if let Err(error) = sink.deliver(&metrics).await {
            harvest_log::error!(
                sink = sink.name(),
                error = &error as &dyn std::error::Error,
                "failed to deliver {} metrics",
                metrics.len()
            );
        }
    }
}

/// Runs the sink worker tasks.
#[derive(Debug)]
pub struct SinkWorkerService {
    queue: IntakeQueue,
    composer: Arc<Composer>,
    sinks: Arc<[Arc<dyn Sink>]>,
    workers: usize,
    batch_size: usize,
}

impl SinkWorkerService {
    /// Creates the service for the given sinks.
    pub fn new(
        config: &Config,
        queue: IntakeQueue,
        composer: Arc<Composer>,
        sinks: Vec<Arc<dyn Sink>>,
    ) -> Self {
        Self {
            queue,
            composer,
            sinks: sinks.into(),
            workers: config.sink_workers(),
            batch_size: config.bulk_max_size(),
        }
    }
}

async fn worker(
    queue: IntakeQueue,
    composer: Arc<Composer>,
    sinks: Arc<[Arc<dyn Sink>]>,
    batch_size: usize,
) {
    let mut shutdown = Controller::shutdown_handle();

    while shutdown.get().is_none() {
        let batch = queue.drain(batch_size);
        harvest_statsd::metric!(gauge(ServerGauges::QueueSize) = queue.len() as u64);

        if batch.is_empty() {
            tokio::select! {
                biased;

                _ = shutdown.notified() => break,
                _ = tokio::time::sleep(IDLE_INTERVAL) => continue,
            }
        }

        process_batch(&composer, &sinks, batch).await;
    }
}

impl Service for SinkWorkerService {
    async fn run(self) {
        let names: Vec<_> = self.sinks.iter().map(|sink| sink.name()).collect();
        harvest_log::info!(
            workers = self.workers,
            "sink workers started, delivering to {}",
            names.join(", ")
        );

        let handles: Vec<_> = (0..self.workers)
            .map(|_| {
                harvest_system::spawn!(worker(
                    self.queue.clone(),
                    self.composer.clone(),
                    self.sinks.clone(),
                    self.batch_size,
                ))
            })
            .collect();

        for result in futures::future::join_all(handles).await {
            if let Err(error) = result
                && error.is_panic()
            {
                std::panic::resume_unwind(error.into_panic());
            }
        }

        harvest_log::info!("sink workers stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use harvest_metrics::{ComposerCache, SampleValue};
    use parking_lot::Mutex;

    use super::*;

    #[derive(Debug, Default)]
    struct Capture(Mutex<Vec<Vec<OutputMetric>>>);

    #[async_trait::async_trait]
    impl Sink for Capture {
        fn name(&self) -> &'static str {
            "capture"
        }

        async fn deliver(&self, metrics: &[OutputMetric]) -> Result<(), DeliveryError> {
            self.0.lock().push(metrics.to_vec());
            Ok(())
        }
    }

    #[derive(Debug)]
    struct Failing;

    #[async_trait::async_trait]
    impl Sink for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn deliver(&self, _: &[OutputMetric]) -> Result<(), DeliveryError> {
            Err(DeliveryError::RetriesExhausted(3))
        }
    }

    fn counter(value: f64) -> RawSample {
        let mut sample = RawSample::new("hits", BTreeMap::new(), SampleValue::Counter(value));
        sample.stamp("app", 80, chrono::Utc::now());
        sample
    }

    #[tokio::test]
    async fn test_compose_once_for_all_sinks() {
        harvest_log::init_test!();

        let composer = Composer::new(Arc::new(ComposerCache::new()));
        let first = Arc::new(Capture::default());
        let second = Arc::new(Capture::default());
        let sinks: Vec<Arc<dyn Sink>> = vec![first.clone(), Arc::new(Failing), second.clone()];

        process_batch(&composer, &sinks, vec![counter(10.0)]).await;
        process_batch(&composer, &sinks, vec![counter(15.0)]).await;

        // both sinks observe the same deltas, the counter was composed once per sample
        for sink in [&first, &second] {
            let values: Vec<_> = sink
                .0
                .lock()
                .iter()
                .flatten()
                .map(|metric| metric.value)
                .collect();
            assert_eq!(values, [10.0, 5.0]);
        }
    }

    #[tokio::test]
    async fn test_empty_batch_is_not_delivered() {
        let composer = Composer::new(Arc::new(ComposerCache::new()));
        let capture = Arc::new(Capture::default());
        let sinks: Vec<Arc<dyn Sink>> = vec![capture.clone()];

        process_batch(&composer, &sinks, Vec::new()).await;
        assert!(capture.0.lock().is_empty());
    }
}
