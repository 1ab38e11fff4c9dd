use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use harvest_config::Config;
use harvest_metrics::OutputMetric;
use harvest_server::{DeliveryError, ElasticsearchSink, Sink};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::json;

/// A bulk endpoint that rejects the first `failures` requests.
#[derive(Debug, Default)]
struct BulkApi {
    failures: usize,
    requests: AtomicUsize,
    bodies: Mutex<Vec<String>>,
}

async fn bulk(State(api): State<Arc<BulkApi>>, body: String) -> StatusCode {
    let attempt = api.requests.fetch_add(1, Ordering::SeqCst);
    api.bodies.lock().push(body);

    if attempt < api.failures {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    }
}

async fn serve(api: Arc<BulkApi>) -> SocketAddr {
    let router = Router::new().route("/_bulk", post(bulk)).with_state(api);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    addr
}

fn sink(addr: SocketAddr, max_retries: u32) -> ElasticsearchSink {
    let config = Config::from_json_value(json!({
        "output": {
            "elasticsearch": {
                "enabled": true,
                "hosts": [addr.to_string()],
                "index": "metrics-test",
                "max_retries": max_retries,
                "timeout": 5,
            }
        }
    }))
    .unwrap();

    ElasticsearchSink::new(&config, reqwest::Client::new())
}

fn metrics() -> Vec<OutputMetric> {
    vec![OutputMetric {
        metric: "jvm_threads_live".to_owned(),
        tags: IndexMap::from([
            ("host".to_owned(), "app".to_owned()),
            ("port".to_owned(), "8080".to_owned()),
        ]),
        timestamp: "2020-01-01T10:00:00.000+0800".to_owned(),
        value: 42.0,
    }]
}

#[tokio::test]
async fn test_retry_then_success() {
    harvest_log::init_test!();

    let api = Arc::new(BulkApi {
        failures: 1,
        ..Default::default()
    });
    let addr = serve(api.clone()).await;

    sink(addr, 3).deliver(&metrics()).await.unwrap();

    assert_eq!(api.requests.load(Ordering::SeqCst), 2);
    let bodies = api.bodies.lock();
    assert_eq!(bodies[0], bodies[1]);
    insta::assert_snapshot!(bodies[1], @r###"
    {"index":{"_index":"metrics-test","_type":"metric"}}
    {"metric":"jvm_threads_live","tags":{"host":"app","port":"8080"},"timestamp":"2020-01-01T10:00:00.000+0800","value":42.0}
    "###);
}

#[tokio::test]
async fn test_retries_exhausted() {
    harvest_log::init_test!();

    let api = Arc::new(BulkApi {
        failures: usize::MAX,
        ..Default::default()
    });
    let addr = serve(api.clone()).await;

    let result = sink(addr, 2).deliver(&metrics()).await;

    assert!(matches!(result, Err(DeliveryError::RetriesExhausted(2))));
    assert_eq!(api.requests.load(Ordering::SeqCst), 2);
}
