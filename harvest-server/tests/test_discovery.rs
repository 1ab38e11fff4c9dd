use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use harvest_metrics::ParserRegistry;
use harvest_server::discover_endpoints;
use serde_json::json;

async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    addr
}

#[tokio::test]
async fn test_probe_follows_registry_order() {
    harvest_log::init_test!();

    // answers on two registered paths, the earlier one in registry order wins
    let instance = serve(
        Router::new()
            .route("/metrics", get(|| async { "{}" }))
            .route("/actuator/prometheus", get(|| async { "" })),
    )
    .await;

    // answers on no registered path
    let silent = serve(Router::new().route("/info", get(|| async { "" }))).await;

    let document = json!({
        "applications": {
            "application": [{
                "name": "ORDERS",
                "instance": [
                    {"status": "UP", "statusPageUrl": format!("http://{instance}/info")},
                    {"status": "UP", "statusPageUrl": format!("http://{silent}/info")},
                ]
            }]
        }
    });

    let hosts = discover_endpoints(
        &document,
        &ParserRegistry::default(),
        &reqwest::Client::new(),
        Duration::from_secs(2),
    )
    .await;

    assert_eq!(hosts, [format!("http://{instance}/actuator/prometheus")]);
}

#[tokio::test]
async fn test_unreachable_instance_is_skipped() {
    let document = json!({
        "applications": {
            "application": {
                "instance": {"status": "UP", "statusPageUrl": "http://127.0.0.1:1/info"}
            }
        }
    });

    let hosts = discover_endpoints(
        &document,
        &ParserRegistry::default(),
        &reqwest::Client::new(),
        Duration::from_millis(200),
    )
    .await;

    assert!(hosts.is_empty());
}
