use std::sync::Arc;
use std::time::Duration;

use harvest_config::Config;
use harvest_metrics::ParserRegistry;
use harvest_system::{Controller, Service};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderValue};
use serde_json::Value;
use url::Url;

use crate::statsd::{ServerGauges, ServerTimers};
use crate::targets::DiscoveredHosts;

/// Reasons the service registry could not be queried.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// The request failed, timed out or returned an unreadable body.
    #[error("registry request failed")]
    Request(#[from] reqwest::Error),
    /// The registry answered with a status outside of 2xx.
    #[error("registry responded with {0}")]
    Status(StatusCode),
}

/// Returns `scheme://host:port` of a status page URL.
fn base_url(status_page_url: &str) -> Option<String> {
    let url = Url::parse(status_page_url).ok()?;
    let host = url.host_str()?;
    let port = url.port_or_known_default()?;
    Some(format!("{}://{host}:{port}", url.scheme()))
}

/// Walks the registry document and collects candidate base URLs in document order.
fn collect_candidates<'a>(value: &'a Value, status: &mut Option<&'a str>, out: &mut Vec<String>) {
    match value {
        Value::Object(object) => {
            for (key, value) in object {
                match (key.as_str(), value) {
                    ("status", Value::String(s)) => *status = Some(s.as_str()),
                    ("statusPageUrl", Value::String(page)) => {
                        harvest_log::debug!(
                            status_page = page.as_str(),
                            status = status.unwrap_or("unknown"),
                            "found registered instance"
                        );
                        if let Some(base) = base_url(page)
                            && !out.contains(&base)
                        {
                            out.push(base);
                        }
                    }
                    _ => collect_candidates(value, status, out),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_candidates(item, status, out);
            }
        }
        _ => {}
    }
}

/// Returns the first registered path under `base` that answers a HEAD request with 2xx.
async fn probe(
    client: &reqwest::Client,
    registry: &ParserRegistry,
    base: &str,
    timeout: Duration,
) -> Option<String> {
    for path in registry.paths() {
        let url = format!("{base}{path}");
        match client.head(&url).timeout(timeout).send().await {
            Ok(response) if response.status().is_success() => return Some(url),
            Ok(response) => {
                harvest_log::trace!(
                    url = url.as_str(),
                    status = response.status().as_u16(),
                    "probe rejected"
                );
            }
            Err(error) => {
                harvest_log::trace!(
                    url = url.as_str(),
                    error = &error as &dyn std::error::Error,
                    "probe failed"
                );
            }
        }
    }

    None
}

/// Resolves the endpoints of all instances listed in a registry document.
///
/// Every instance with a `statusPageUrl` is probed for the registry's paths in order. Instances
/// that answer on none of them are left out.
pub async fn discover_endpoints(
    document: &Value,
    registry: &ParserRegistry,
    client: &reqwest::Client,
    probe_timeout: Duration,
) -> Vec<String> {
    let mut candidates = Vec::new();
    collect_candidates(document, &mut None, &mut candidates);

    let probes = candidates
        .iter()
        .map(|base| probe(client, registry, base, probe_timeout));

    futures::future::join_all(probes)
        .await
        .into_iter()
        .flatten()
        .collect()
}

/// Periodically queries a service registry and replaces the discovered endpoints.
#[derive(Debug)]
pub struct DiscoveryService {
    url: String,
    interval: Duration,
    probe_timeout: Duration,
    client: reqwest::Client,
    registry: Arc<ParserRegistry>,
    discovered: Arc<DiscoveredHosts>,
}

impl DiscoveryService {
    /// Creates the service if a registry URL is configured.
    pub fn new(
        config: &Config,
        client: reqwest::Client,
        registry: Arc<ParserRegistry>,
        discovered: Arc<DiscoveredHosts>,
    ) -> Option<Self> {
        Some(Self {
            url: config.eureka_url()?.to_owned(),
            interval: config.eureka_refresh_interval(),
            probe_timeout: config.eureka_probe_timeout(),
            client,
            registry,
            discovered,
        })
    }

    async fn fetch_document(&self) -> Result<Value, DiscoveryError> {
        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .timeout(self.interval)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::Status(status));
        }

        Ok(response.json().await?)
    }

    async fn refresh(&self) -> Result<usize, DiscoveryError> {
        let document = harvest_statsd::metric!(timer(ServerTimers::DiscoveryRefresh), {
            self.fetch_document().await
        })?;

        let hosts =
            discover_endpoints(&document, &self.registry, &self.client, self.probe_timeout).await;
        let count = hosts.len();

        self.discovered.store(hosts);
        harvest_statsd::metric!(gauge(ServerGauges::DiscoveredHosts) = count as u64);
        Ok(count)
    }
}

impl Service for DiscoveryService {
    async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut shutdown = Controller::shutdown_handle();

        harvest_log::info!(url = self.url.as_str(), "registry discovery started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.notified() => break,
                _ = ticker.tick() => (),
            }

            match self.refresh().await {
                Ok(count) => harvest_log::debug!(count, "discovered endpoints"),
                Err(error) => harvest_log::error!(
                    error = &error as &dyn std::error::Error,
                    "failed to query service registry, keeping previous endpoints"
                ),
            }
        }

        harvest_log::info!("registry discovery stopped");
    }
}
