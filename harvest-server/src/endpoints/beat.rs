//! Runtime access to the scrape targets.

use axum::Json;
use axum::extract::State;

use crate::service::ServiceState;

pub async fn period(State(state): State<ServiceState>) -> Json<u64> {
    Json(state.config().beat_period().as_secs())
}

pub async fn get_hosts(State(state): State<ServiceState>) -> Json<Vec<String>> {
    Json(state.targets().hosts.get())
}

pub async fn replace_hosts(
    State(state): State<ServiceState>,
    Json(hosts): Json<Vec<String>>,
) -> Json<Vec<String>> {
    let hosts = state.targets().hosts.replace(hosts);
    harvest_log::info!("replaced scrape hosts: {}", hosts.join(", "));
    Json(hosts)
}

pub async fn extend_hosts(
    State(state): State<ServiceState>,
    Json(hosts): Json<Vec<String>>,
) -> Json<Vec<String>> {
    let hosts = state.targets().hosts.extend(hosts);
    harvest_log::info!("extended scrape hosts: {}", hosts.join(", "));
    Json(hosts)
}

pub async fn get_excludes(State(state): State<ServiceState>) -> Json<Vec<String>> {
    Json(state.targets().excludes.get())
}

pub async fn replace_excludes(
    State(state): State<ServiceState>,
    Json(excludes): Json<Vec<String>>,
) -> Json<Vec<String>> {
    let excludes = state.targets().excludes.replace(excludes);
    harvest_log::info!("replaced excluded metrics: {}", excludes.join(", "));
    Json(excludes)
}

pub async fn extend_excludes(
    State(state): State<ServiceState>,
    Json(excludes): Json<Vec<String>>,
) -> Json<Vec<String>> {
    let excludes = state.targets().excludes.extend(excludes);
    harvest_log::info!("extended excluded metrics: {}", excludes.join(", "));
    Json(excludes)
}
