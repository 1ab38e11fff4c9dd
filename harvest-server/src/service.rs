use std::sync::Arc;

use harvest_config::Config;
use harvest_metrics::{Composer, ComposerCache};
use harvest_system::ServiceRunner;

use crate::queue::IntakeQueue;
use crate::services::{
    CachePersistService, DiscoveryService, ElasticsearchSink, FileSink, PollerService, Scraper,
    Sink, SinkWorkerService,
};
use crate::targets::{DiscoveredHosts, Targets};

/// Indicates the type of failure of the services.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Neither the elasticsearch nor the file output is enabled.
    #[error("no output enabled, enable output.elasticsearch or output.file")]
    NoSink,

    /// The HTTP client could not be created.
    #[error("could not initialize http client")]
    HttpClient(#[from] reqwest::Error),

    /// The directory of the metrics file could not be prepared.
    #[error("could not initialize file output")]
    FileSink(#[from] tracing_appender::rolling::InitError),
}

#[derive(Debug)]
struct StateInner {
    config: Arc<Config>,
    targets: Arc<Targets>,
}

/// Server state shared with the control API.
#[derive(Clone, Debug)]
pub struct ServiceState {
    inner: Arc<StateInner>,
}

impl ServiceState {
    /// Creates the state without starting any services.
    pub fn new(config: Arc<Config>, targets: Arc<Targets>) -> Self {
        Self {
            inner: Arc::new(StateInner { config, targets }),
        }
    }

    /// Starts all services and returns the state of the control API.
    ///
    /// The composer cache is restored before the sink workers start.
    pub fn start(config: Arc<Config>, runner: &mut ServiceRunner) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder().build()?;

        let mut sinks: Vec<Arc<dyn Sink>> = Vec::new();
        if config.elasticsearch_enabled() {
            sinks.push(Arc::new(ElasticsearchSink::new(&config, client.clone())));
        }
        if config.file_enabled() {
            sinks.push(Arc::new(FileSink::new(&config)?));
        }
        if sinks.is_empty() {
            return Err(ServiceError::NoSink);
        }

        let registry = Arc::new(config.parser_registry());
        let queue = IntakeQueue::new(config.queue_capacity());
        let targets = Arc::new(Targets::new(config.static_hosts(), config.excludes()));
        let discovered = Arc::new(DiscoveredHosts::default());

        let cache = Arc::new(ComposerCache::new());
        let persist = CachePersistService::new(&config, cache.clone());
        persist.rehydrate();
        let composer = Arc::new(Composer::new(cache));

        let scraper = Scraper::new(
            client.clone(),
            registry.clone(),
            queue.clone(),
            config.beat_timeout(),
        );
        runner.start(PollerService::new(
            &config,
            scraper,
            targets.clone(),
            discovered.clone(),
        ));

        if let Some(discovery) = DiscoveryService::new(&config, client, registry, discovered) {
            runner.start(discovery);
        }

        runner.start(persist);
        runner.start(SinkWorkerService::new(&config, queue, composer, sinks));

        Ok(Self::new(config, targets))
    }

    /// Returns a reference to the daemon configuration.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Returns the runtime-mutable scrape targets.
    pub fn targets(&self) -> &Targets {
        &self.inner.targets
    }
}
