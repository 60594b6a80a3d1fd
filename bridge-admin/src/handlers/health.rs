use crate::server::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde_json::{Value, json};
use std::sync::Arc;

/// GET /health
///
/// Only the route table is checked; unreachable backends never degrade it.
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let (status, code, check, registered) = match state.table.health_check() {
        Ok(count) => ("healthy", StatusCode::OK, "healthy".to_string(), count),
        Err(e) => {
            tracing::error!(error = %e, "Route table health check failed");
            (
                "degraded",
                StatusCode::SERVICE_UNAVAILABLE,
                format!("unhealthy: {e}"),
                0,
            )
        }
    };

    (
        code,
        Json(json!({
            "status": status,
            "service": "bridge",
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "uptime_seconds": state.started.elapsed().as_secs_f64(),
            "registered_services": registered,
            "checks": { "route_table": check },
        })),
    )
}
