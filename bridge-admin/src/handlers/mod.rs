pub mod health;
pub mod metrics;
pub mod proxy;
pub mod services;
pub mod stats;

use axum::Json;
use axum::http::StatusCode;
use bridge_core::error::BridgeError;
use serde_json::{Value, json};

/// Management-endpoint error reply: status from the error taxonomy, body
/// `{"error": ..., "status": ...}`.
pub(crate) fn error_reply(e: &BridgeError) -> (StatusCode, Json<Value>) {
    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "error": e.to_string(), "status": status.as_u16() })))
}
