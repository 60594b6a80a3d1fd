use crate::server::AppState;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use std::sync::Arc;

/// Prometheus scrape endpoint. Service status gauges are refreshed first.
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.table.list() {
        Ok(services) => state.metrics.update_service_status(&services),
        Err(e) => tracing::warn!(error = %e, "Service status gauges not refreshed"),
    }
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
