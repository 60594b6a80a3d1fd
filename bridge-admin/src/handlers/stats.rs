use super::error_reply;
use crate::server::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub window_secs: Option<u64>,
}

/// GET /stats[?window_secs=N]
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> (StatusCode, Json<Value>) {
    let secs = query
        .window_secs
        .unwrap_or(state.config.accounting.default_window_secs);
    match state.accountant.stats(state.table.as_ref(), Duration::from_secs(secs)) {
        Ok(stats) => (StatusCode::OK, Json(json!(stats))),
        Err(e) => {
            tracing::error!(error = %e, "Stats unavailable");
            error_reply(&e)
        }
    }
}
