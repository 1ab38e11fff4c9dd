//! Control API endpoints.
//!
//! The API reads the scrape period and edits the static hosts and exclusions at runtime.
//! Changes apply on the poller's next tick.

use axum::Router;
use axum::routing::get;

use crate::service::ServiceState;

mod beat;
mod health_check;

/// Returns all control API routes.
pub fn routes() -> Router<ServiceState> {
    Router::new()
        .route("/api/health", get(health_check::handle))
        .route("/v1/beat/period", get(beat::period))
        .route(
            "/v1/beat/hosts",
            get(beat::get_hosts)
                .put(beat::replace_hosts)
                .patch(beat::extend_hosts),
        )
        .route(
            "/v1/beat/excludes",
            get(beat::get_excludes)
                .put(beat::replace_excludes)
                .patch(beat::extend_excludes),
        )
}
