use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use harvest_config::Config;
use harvest_metrics::ParserRegistry;
use harvest_system::{Controller, Service};
use reqwest::StatusCode;
use tokio::time::{Instant, MissedTickBehavior};
use url::Url;

use crate::queue::IntakeQueue;
use crate::statsd::{ServerCounters, ServerTimers};
use crate::targets::{DiscoveredHosts, Targets, effective_hosts};

/// Interval at which the poller checks whether the scrape period has elapsed.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Reasons a single endpoint could not be scraped.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The endpoint is not a valid URL.
    #[error("invalid endpoint url")]
    InvalidUrl(#[from] url::ParseError),
    /// No parser is registered for the endpoint's path.
    #[error("no parser registered for path {0}")]
    NoParser(String),
    /// The request failed or timed out.
    #[error("request failed")]
    Request(#[from] reqwest::Error),
    /// The endpoint answered with a status outside of 2xx.
    #[error("endpoint responded with {0}")]
    Status(StatusCode),
}

/// Fetches endpoints and admits their samples to the intake queue.
#[derive(Debug, Clone)]
pub struct Scraper {
    client: reqwest::Client,
    registry: Arc<ParserRegistry>,
    queue: IntakeQueue,
    timeout: Duration,
}

impl Scraper {
    /// Creates a scraper using the given client for all requests.
    pub fn new(
        client: reqwest::Client,
        registry: Arc<ParserRegistry>,
        queue: IntakeQueue,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            registry,
            queue,
            timeout,
        }
    }

    async fn fetch(&self, url: Url) -> Result<String, FetchError> {
        let response = self.client.get(url).timeout(self.timeout).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        Ok(response.text().await?)
    }

    /// Scrapes one endpoint and returns the number of admitted samples.
    ///
    /// Samples whose name is in `excludes` are dropped before admission.
    pub async fn scrape(&self, endpoint: &str, excludes: &HashSet<String>) -> Result<usize, FetchError> {
        let url = Url::parse(endpoint)?;
        let format = self
            .registry
            .get(url.path())
            .ok_or_else(|| FetchError::NoParser(url.path().to_owned()))?;

        let host = url.host_str().unwrap_or_default().to_owned();
        let port = url.port_or_known_default().unwrap_or_default();
        let host_tag = format!("{host}:{port}");

        let scraped_at = Utc::now();
        let result = harvest_statsd::metric!(timer(ServerTimers::FetchDuration), host = &host_tag, {
            self.fetch(url).await
        });

        let body = match result {
            Ok(body) => {
                harvest_statsd::metric!(counter(ServerCounters::FetchOk) += 1, host = &host_tag);
                body
            }
            Err(error) => {
                harvest_statsd::metric!(counter(ServerCounters::FetchError) += 1, host = &host_tag);
                return Err(error);
            }
        };

        let mut samples = format.parse(&body);
        let parsed = samples.len();
        samples.retain(|sample| !excludes.contains(&sample.name));

        let excluded = parsed - samples.len();
        harvest_statsd::metric!(counter(ServerCounters::SamplesExcluded) += excluded as i64);

        for sample in &mut samples {
            sample.stamp(&host, port, scraped_at);
        }

        let admitted = self.queue.put(samples).await;
        harvest_statsd::metric!(counter(ServerCounters::SamplesEnqueued) += admitted as i64);
        harvest_log::trace!(endpoint, admitted, excluded, "scraped endpoint");

        Ok(admitted)
    }

    /// Scrapes all endpoints concurrently.
    ///
    /// Failures are logged per endpoint and do not affect the others.
    pub async fn scrape_all(&self, endpoints: &[String], excludes: &HashSet<String>) -> usize {
        let scrapes = endpoints.iter().map(|endpoint| async move {
            match self.scrape(endpoint, excludes).await {
                Ok(admitted) => admitted,
                Err(error @ (FetchError::InvalidUrl(_) | FetchError::NoParser(_))) => {
                    harvest_log::warn!(
                        endpoint,
                        error = &error as &dyn std::error::Error,
                        "skipping endpoint"
                    );
                    0
                }
                Err(error) => {
                    harvest_log::error!(
                        endpoint,
                        error = &error as &dyn std::error::Error,
                        "failed to scrape endpoint"
                    );
                    0
                }
            }
        });

        futures::future::join_all(scrapes).await.into_iter().sum()
    }
}

/// Periodically scrapes all static and discovered endpoints.
///
/// Scrapes never overlap: a scrape that takes longer than the period delays the next one.
#[derive(Debug)]
pub struct PollerService {
    scraper: Scraper,
    period: Duration,
    targets: Arc<Targets>,
    discovered: Arc<DiscoveredHosts>,
}

impl PollerService {
    /// Creates a new poller.
    pub fn new(
        config: &Config,
        scraper: Scraper,
        targets: Arc<Targets>,
        discovered: Arc<DiscoveredHosts>,
    ) -> Self {
        Self {
            scraper,
            period: config.beat_period(),
            targets,
            discovered,
        }
    }

    async fn tick(&self) {
        let endpoints = effective_hosts(self.targets.hosts.get(), &self.discovered.load());
        let excludes: HashSet<String> = self.targets.excludes.get().into_iter().collect();

        let admitted = self.scraper.scrape_all(&endpoints, &excludes).await;
        harvest_log::debug!(endpoints = endpoints.len(), admitted, "scrape finished");
    }
}

impl Service for PollerService {
    async fn run(self) {
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut shutdown = Controller::shutdown_handle();
        let mut last_scrape: Option<Instant> = None;

        harvest_log::info!("poller started, period {}s", self.period.as_secs());

        loop {
            tokio::select! {
                biased;

                _ = shutdown.notified() => break,
                _ = ticker.tick() => (),
            }

            if last_scrape.is_some_and(|last| last.elapsed() < self.period) {
                continue;
            }

            last_scrape = Some(Instant::now());
            self.tick().await;
        }

        harvest_log::info!("poller stopped");
    }
}
