use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use harvest_config::Config;
use harvest_metrics::{ComposerCache, SnapshotError};
use harvest_system::{Controller, Service};

use crate::statsd::{ServerCounters, ServerGauges};

/// Evicts stale composer cache entries and writes snapshots of the cache to disk.
///
/// A snapshot is written every `snapshot_interval` and once more on shutdown, so that counter
/// deltas continue across restarts.
#[derive(Debug)]
pub struct CachePersistService {
    cache: Arc<ComposerCache>,
    path: PathBuf,
    retention: Duration,
    interval: Duration,
}

impl CachePersistService {
    /// Creates the service for the given cache.
    pub fn new(config: &Config, cache: Arc<ComposerCache>) -> Self {
        Self {
            cache,
            path: config.cache_path(),
            retention: config.cache_retention(),
            interval: config.cache_snapshot_interval(),
        }
    }

    /// Restores the cache from the last snapshot.
    ///
    /// Must run before any sample is composed. Failures are logged, the cache then starts
    /// empty.
    pub fn rehydrate(&self) {
        match self.cache.load(&self.path, Utc::now(), self.retention) {
            Ok(summary) => harvest_log::info!(
                loaded = summary.loaded,
                skipped = summary.skipped,
                expired = summary.expired,
                "restored composer cache from {}",
                self.path.display()
            ),
            Err(error) => harvest_log::error!(
                error = &error as &dyn std::error::Error,
                "failed to restore composer cache, starting empty"
            ),
        }

        harvest_statsd::metric!(gauge(ServerGauges::CacheEntries) = self.cache.len() as u64);
    }

    /// Evicts expired entries and writes a snapshot.
    pub async fn snapshot(&self) -> Result<usize, SnapshotError> {
        let evicted = self.cache.evict(Utc::now(), self.retention);
        if evicted > 0 {
            harvest_log::debug!(evicted, "evicted stale composer cache entries");
        }
        harvest_statsd::metric!(gauge(ServerGauges::CacheEntries) = self.cache.len() as u64);

        let cache = self.cache.clone();
        let path = self.path.clone();
        match tokio::task::spawn_blocking(move || cache.save(&path)).await {
            Ok(result) => result,
            Err(error) => std::panic::resume_unwind(error.into_panic()),
        }
    }

    async fn persist(&self) {
        match self.snapshot().await {
            Ok(written) => harvest_log::trace!(written, "wrote composer cache snapshot"),
            Err(error) => {
                harvest_statsd::metric!(counter(ServerCounters::CacheSnapshotError) += 1);
                harvest_log::error!(
                    error = &error as &dyn std::error::Error,
                    "failed to write composer cache snapshot"
                );
            }
        }
    }
}

impl Service for CachePersistService {
    async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.reset();
        let mut shutdown = Controller::shutdown_handle();

        harvest_log::info!(
            "composer cache snapshots every {}s to {}",
            self.interval.as_secs(),
            self.path.display()
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown.notified() => break,
                _ = ticker.tick() => self.persist().await,
            }
        }

        self.persist().await;
        harvest_log::info!("composer cache persisted");
    }
}
