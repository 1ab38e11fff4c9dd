use std::time::Duration;

use harvest_metrics::RawSample;

use crate::statsd::ServerCounters;

/// Time after which a blocked admission logs a warning and keeps waiting.
pub const ADMISSION_WARN_INTERVAL: Duration = Duration::from_secs(1);

/// Bounded buffer between the poller and the sink workers.
///
/// Cloning the queue yields another handle to the same buffer. Producers wait in
/// [`put`](Self::put) while the queue is full, consumers never wait.
#[derive(Clone, Debug)]
pub struct IntakeQueue {
    tx: flume::Sender<RawSample>,
    rx: flume::Receiver<RawSample>,
    capacity: usize,
}

impl IntakeQueue {
    /// Creates an empty queue holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = flume::bounded(capacity);
        Self { tx, rx, capacity }
    }

    /// Admits all samples, waiting for space as needed.
    ///
    /// A sample that cannot be admitted within [`ADMISSION_WARN_INTERVAL`] is reported and
    /// admission continues to wait. Samples are never dropped.
    pub async fn put(&self, samples: impl IntoIterator<Item = RawSample>) -> usize {
        let mut admitted = 0;

        for sample in samples {
            let send = self.tx.send_async(sample);
            tokio::pin!(send);

            loop {
                match tokio::time::timeout(ADMISSION_WARN_INTERVAL, send.as_mut()).await {
                    Ok(Ok(())) => break,
                    // both ends live in this handle
                    Ok(Err(_)) => return admitted,
                    Err(_) => {
                        harvest_log::warn!(
                            capacity = self.capacity,
                            "intake queue is full, waiting for sink workers"
                        );
                        harvest_statsd::metric!(counter(ServerCounters::AdmissionStalled) += 1);
                    }
                }
            }

            admitted += 1;
        }

        admitted
    }

    /// Removes up to `max` samples without waiting.
    pub fn drain(&self, max: usize) -> Vec<RawSample> {
        let mut batch = Vec::with_capacity(max.min(self.rx.len()));
        while batch.len() < max {
            match self.rx.try_recv() {
                Ok(sample) => batch.push(sample),
                Err(_) => break,
            }
        }
        batch
    }

    /// Returns the number of queued samples.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns `true` if no sample is queued.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Returns the maximum number of queued samples.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
