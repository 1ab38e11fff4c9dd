//! A simple health check endpoint for the daemon.

use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct Status {
    is_healthy: bool,
}

pub async fn handle() -> Json<Status> {
    Json(Status { is_healthy: true })
}
