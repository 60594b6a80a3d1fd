use super::error_reply;
use crate::server::AppState;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use bridge_core::error::BridgeError;
use bridge_core::service::{NewService, ServiceId, ServicePatch};
use serde_json::{Value, json};
use std::sync::Arc;

/// GET /services
pub async fn list_services(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    match state.table.list() {
        Ok(services) => {
            state.metrics.update_service_status(&services);
            (StatusCode::OK, Json(json!(services)))
        }
        Err(e) => error_reply(&e),
    }
}

/// POST /services
pub async fn create_service(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewService>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let new = match body {
        Ok(Json(new)) => new,
        Err(e) => return error_reply(&BridgeError::Validation(e.body_text())),
    };
    match state.table.add(new) {
        Ok(id) => (
            StatusCode::CREATED,
            Json(json!({ "id": id, "message": "Service added successfully" })),
        ),
        Err(e) => error_reply(&e),
    }
}

/// `{id}` path segment; a non-numeric id is a validation error.
fn service_id(id: Result<Path<ServiceId>, PathRejection>) -> Result<ServiceId, BridgeError> {
    id.map(|Path(id)| id)
        .map_err(|e| BridgeError::Validation(format!("invalid service id: {}", e.body_text())))
}

/// GET /services/{id}
pub async fn get_service(
    State(state): State<Arc<AppState>>,
    id: Result<Path<ServiceId>, PathRejection>,
) -> (StatusCode, Json<Value>) {
    let id = match service_id(id) {
        Ok(id) => id,
        Err(e) => return error_reply(&e),
    };
    match state.table.get(id) {
        Ok(svc) => (StatusCode::OK, Json(json!(svc))),
        Err(e) => error_reply(&e),
    }
}

/// PUT /services/{id}
pub async fn update_service(
    State(state): State<Arc<AppState>>,
    id: Result<Path<ServiceId>, PathRejection>,
    body: Result<Json<ServicePatch>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let id = match service_id(id) {
        Ok(id) => id,
        Err(e) => return error_reply(&e),
    };
    let patch = match body {
        Ok(Json(patch)) => patch,
        Err(e) => return error_reply(&BridgeError::Validation(e.body_text())),
    };
    match state.table.update(id, patch) {
        Ok(svc) => (
            StatusCode::OK,
            Json(json!({ "message": "Service updated successfully", "service": svc })),
        ),
        Err(e) => error_reply(&e),
    }
}

/// DELETE /services/{id}
pub async fn delete_service(
    State(state): State<Arc<AppState>>,
    id: Result<Path<ServiceId>, PathRejection>,
) -> (StatusCode, Json<Value>) {
    let id = match service_id(id) {
        Ok(id) => id,
        Err(e) => return error_reply(&e),
    };
    match state.table.remove(id) {
        Ok(()) => {
            state.gateway.forget_service(id);
            (StatusCode::OK, Json(json!({ "deleted": true })))
        }
        Err(e) => error_reply(&e),
    }
}
