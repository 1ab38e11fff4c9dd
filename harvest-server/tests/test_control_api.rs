use std::net::SocketAddr;
use std::sync::Arc;

use harvest_config::Config;
use harvest_server::{ServiceState, Targets};
use serde_json::{Value, json};

async fn serve(config: Config) -> (SocketAddr, ServiceState) {
    let config = Arc::new(config);
    let targets = Arc::new(Targets::new(config.static_hosts(), config.excludes()));
    let state = ServiceState::new(config, targets);

    let router = harvest_server::endpoints::routes().with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    (addr, state)
}

async fn send(request: reqwest::RequestBuilder) -> Value {
    let response = request.send().await.unwrap();
    assert!(response.status().is_success());
    response.json().await.unwrap()
}

#[tokio::test]
async fn test_period_and_health() {
    let config = Config::from_json_value(json!({"beat": {"period": 30}})).unwrap();
    let (addr, _) = serve(config).await;
    let client = reqwest::Client::new();

    let period = send(client.get(format!("http://{addr}/v1/beat/period"))).await;
    assert_eq!(period, json!(30));

    let health = send(client.get(format!("http://{addr}/api/health"))).await;
    assert_eq!(health, json!({"is_healthy": true}));
}

#[tokio::test]
async fn test_hosts_put_and_patch() {
    harvest_log::init_test!();

    let config = Config::from_json_value(json!({
        "beat": {"hosts": ["http://a:80/metrics"]}
    }))
    .unwrap();
    let (addr, state) = serve(config).await;
    let client = reqwest::Client::new();
    let url = format!("http://{addr}/v1/beat/hosts");

    let hosts = send(client.get(&url)).await;
    assert_eq!(hosts, json!(["http://a:80/metrics"]));

    let hosts = send(client.put(&url).json(&json!(["http://b", "http://c", "http://b"]))).await;
    assert_eq!(hosts, json!(["http://b", "http://c"]));

    let hosts = send(client.patch(&url).json(&json!(["http://c", "http://d"]))).await;
    assert_eq!(hosts, json!(["http://b", "http://c", "http://d"]));

    assert_eq!(state.targets().hosts.get(), ["http://b", "http://c", "http://d"]);
}

#[tokio::test]
async fn test_excludes_put_and_patch() {
    harvest_log::init_test!();

    let (addr, state) = serve(Config::from_json_value(json!({})).unwrap()).await;
    let client = reqwest::Client::new();
    let url = format!("http://{addr}/v1/beat/excludes");

    let excludes = send(client.get(&url)).await;
    assert_eq!(excludes, json!([]));

    let excludes = send(client.patch(&url).json(&json!(["jvm_gc_pause"]))).await;
    assert_eq!(excludes, json!(["jvm_gc_pause"]));

    let excludes = send(client.put(&url).json(&json!(["mem", "mem"]))).await;
    assert_eq!(excludes, json!(["mem"]));

    assert_eq!(state.targets().excludes.get(), ["mem"]);
}
