use std::time::Duration;

use chrono::Local;
use harvest_config::Config;
use harvest_metrics::OutputMetric;
use rand::Rng;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use serde_json::json;

use crate::services::sink::{DeliveryError, Sink};
use crate::statsd::{ServerCounters, ServerTimers, SinkKind};

/// Document type of the bulk action line.
const DOCUMENT_TYPE: &str = "metric";

/// Builds a bulk request body with one action line and one document line per metric.
///
/// Metrics with a value of exactly zero are left out if `omit_zero` is set.
pub fn bulk_body(
    metrics: &[OutputMetric],
    index: &str,
    omit_zero: bool,
) -> Result<String, serde_json::Error> {
    let action = serde_json::to_string(&json!({
        "index": {"_index": index, "_type": DOCUMENT_TYPE}
    }))?;

    let mut body = String::new();
    for metric in metrics {
        if omit_zero && metric.value == 0.0 {
            continue;
        }

        body.push_str(&action);
        body.push('\n');
        body.push_str(&serde_json::to_string(metric)?);
        body.push('\n');
    }

    Ok(body)
}

/// Delivers metrics to the bulk API of an indexing store.
#[derive(Debug)]
pub struct ElasticsearchSink {
    client: reqwest::Client,
    hosts: Vec<String>,
    index_pattern: String,
    max_retries: u32,
    timeout: Duration,
    omit_zero: bool,
}

impl ElasticsearchSink {
    /// Creates the sink from the `output.elasticsearch` section.
    pub fn new(config: &Config, client: reqwest::Client) -> Self {
        Self {
            client,
            hosts: config.elasticsearch_hosts().to_vec(),
            index_pattern: config.elasticsearch_index().to_owned(),
            max_retries: config.elasticsearch_max_retries().max(1),
            timeout: config.elasticsearch_timeout(),
            omit_zero: config.elasticsearch_omit_zero(),
        }
    }

    /// Returns the index for a write happening now.
    pub fn index_name(&self) -> String {
        Local::now().format(&self.index_pattern).to_string()
    }

    fn pick_host(&self) -> Option<&str> {
        match self.hosts.as_slice() {
            [] => None,
            [host] => Some(host.as_str()),
            hosts => Some(hosts[rand::rng().random_range(0..hosts.len())].as_str()),
        }
    }

    async fn post(&self, body: String) -> Result<(), DeliveryError> {
        let host = self.pick_host().ok_or(DeliveryError::NoHost)?;
        let url = format!("http://{host}/_bulk");

        for attempt in 1..=self.max_retries {
            let result = self
                .client
                .post(&url)
                .header(CONTENT_TYPE, HeaderValue::from_static("application/x-ndjson"))
                .timeout(self.timeout)
                .body(body.clone())
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) => harvest_log::warn!(
                    attempt,
                    status = response.status().as_u16(),
                    "bulk request rejected by {host}"
                ),
                Err(error) => harvest_log::warn!(
                    attempt,
                    error = &error as &dyn std::error::Error,
                    "bulk request to {host} failed"
                ),
            }
        }

        Err(DeliveryError::RetriesExhausted(self.max_retries))
    }
}

#[async_trait::async_trait]
impl Sink for ElasticsearchSink {
    fn name(&self) -> &'static str {
        "elasticsearch"
    }

    async fn deliver(&self, metrics: &[OutputMetric]) -> Result<(), DeliveryError> {
        let result = harvest_statsd::metric!(timer(ServerTimers::ElasticsearchWrite), {
            match bulk_body(metrics, &self.index_name(), self.omit_zero) {
                Ok(body) if body.is_empty() => Ok(()),
                Ok(body) => self.post(body).await,
                Err(error) => Err(DeliveryError::from(error)),
            }
        });

        match result {
            Ok(()) => {
                harvest_statsd::metric!(
                    counter(ServerCounters::WriteOk(SinkKind::Elasticsearch)) += 1
                );
            }
            Err(_) => {
                harvest_statsd::metric!(
                    counter(ServerCounters::WriteError(SinkKind::Elasticsearch)) += 1
                );
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;

    fn metric(name: &str, value: f64) -> OutputMetric {
        OutputMetric {
            metric: name.to_owned(),
            tags: IndexMap::from([
                ("host".to_owned(), "app".to_owned()),
                ("port".to_owned(), "80".to_owned()),
            ]),
            timestamp: "2020-01-01T10:00:00.000+0800".to_owned(),
            value,
        }
    }

    #[test]
    fn test_bulk_body_layout() {
        let body = bulk_body(&[metric("a", 1.0), metric("b", 0.0)], "metrics-2020.01.01", false)
            .unwrap();

        insta::assert_snapshot!(body, @r###"
        {"index":{"_index":"metrics-2020.01.01","_type":"metric"}}
        {"metric":"a","tags":{"host":"app","port":"80"},"timestamp":"2020-01-01T10:00:00.000+0800","value":1.0}
        {"index":{"_index":"metrics-2020.01.01","_type":"metric"}}
        {"metric":"b","tags":{"host":"app","port":"80"},"timestamp":"2020-01-01T10:00:00.000+0800","value":0.0}
        "###);
    }

    #[test]
    fn test_bulk_body_omit_zero() {
        let body = bulk_body(&[metric("a", 0.0), metric("b", 2.0)], "idx", true).unwrap();
        assert_eq!(body.lines().count(), 2);
        assert!(body.contains("\"metric\":\"b\""));

        assert!(bulk_body(&[metric("a", 0.0)], "idx", true).unwrap().is_empty());
    }
}
