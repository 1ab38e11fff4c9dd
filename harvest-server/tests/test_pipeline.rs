use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use harvest_metrics::{Composer, ComposerCache, OutputMetric, ParserRegistry};
use harvest_server::{DeliveryError, IntakeQueue, Scraper, Sink, process_batch};
use parking_lot::Mutex;

const EXPOSITION: &str = "\
# HELP http_requests_total Total requests
# TYPE http_requests_total counter
http_requests_total{method=\"GET\",} 10.0
# HELP jvm_threads_live Current thread count
# TYPE jvm_threads_live gauge
jvm_threads_live 42.0
# HELP rpc_seconds RPC latency
# TYPE rpc_seconds summary
rpc_seconds_count 4
rpc_seconds_sum 10
";

#[derive(Debug, Default)]
struct Capture(Mutex<Vec<OutputMetric>>);

#[async_trait::async_trait]
impl Sink for Capture {
    fn name(&self) -> &'static str {
        "capture"
    }

    async fn deliver(&self, metrics: &[OutputMetric]) -> Result<(), DeliveryError> {
        self.0.lock().extend_from_slice(metrics);
        Ok(())
    }
}

async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    addr
}

fn scraper(queue: &IntakeQueue) -> Scraper {
    Scraper::new(
        reqwest::Client::new(),
        Arc::new(ParserRegistry::default()),
        queue.clone(),
        Duration::from_secs(5),
    )
}

#[tokio::test]
async fn test_scrape_compose_deliver() {
    harvest_log::init_test!();

    let addr = serve(Router::new().route("/prometheus", get(|| async { EXPOSITION }))).await;
    let queue = IntakeQueue::new(100);

    let endpoints = [format!("http://{addr}/prometheus")];
    let excludes = HashSet::from(["jvm_threads_live".to_owned()]);
    let admitted = scraper(&queue).scrape_all(&endpoints, &excludes).await;
    assert_eq!(admitted, 2);

    let composer = Composer::new(Arc::new(ComposerCache::new()));
    let capture = Arc::new(Capture::default());
    let sinks: Vec<Arc<dyn Sink>> = vec![capture.clone()];
    process_batch(&composer, &sinks, queue.drain(100)).await;

    let metrics = capture.0.lock().clone();
    let summary: Vec<_> = metrics
        .iter()
        .map(|metric| (metric.metric.as_str(), metric.value))
        .collect();
    similar_asserts::assert_eq!(
        summary,
        [
            ("http_requests_total", 10.0),
            ("rpc_seconds_count", 4.0),
            ("rpc_seconds_sum", 10.0),
            ("rpc_seconds", 2.5),
        ]
    );

    let port = addr.port().to_string();
    let tags: Vec<_> = metrics[0].tags.iter().collect();
    assert_eq!(
        tags,
        [
            (&"host".to_owned(), &"127.0.0.1".to_owned()),
            (&"port".to_owned(), &port),
            (&"method".to_owned(), &"GET".to_owned()),
        ]
    );
}

#[tokio::test]
async fn test_counter_deltas_across_scrapes() {
    let count = Arc::new(Mutex::new(100u32));
    let handler_count = count.clone();
    let router = Router::new().route(
        "/metrics",
        get(move || {
            let count = handler_count.clone();
            async move { format!("{{\"counter.jobs\": {}}}", *count.lock()) }
        }),
    );

    let addr = serve(router).await;
    let queue = IntakeQueue::new(100);
    let scraper = scraper(&queue);
    let endpoints = [format!("http://{addr}/metrics")];

    let composer = Composer::new(Arc::new(ComposerCache::new()));
    let capture = Arc::new(Capture::default());
    let sinks: Vec<Arc<dyn Sink>> = vec![capture.clone()];

    for next in [130, 20] {
        scraper.scrape_all(&endpoints, &HashSet::new()).await;
        process_batch(&composer, &sinks, queue.drain(100)).await;
        *count.lock() = next;
    }
    scraper.scrape_all(&endpoints, &HashSet::new()).await;
    process_batch(&composer, &sinks, queue.drain(100)).await;

    let values: Vec<_> = capture.0.lock().iter().map(|metric| metric.value).collect();
    // the last scrape observes a reset and reports the raw value
    assert_eq!(values, [100.0, 30.0, 20.0]);
}

#[tokio::test]
async fn test_error_status_admits_nothing() {
    harvest_log::init_test!();

    let router = Router::new().route(
        "/prometheus",
        get(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, EXPOSITION) }),
    );
    let addr = serve(router).await;
    let queue = IntakeQueue::new(100);

    let endpoints = [format!("http://{addr}/prometheus")];
    let admitted = scraper(&queue).scrape_all(&endpoints, &HashSet::new()).await;

    assert_eq!(admitted, 0);
    assert!(queue.is_empty());
}
