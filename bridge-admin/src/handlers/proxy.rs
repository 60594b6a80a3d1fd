use crate::server::AppState;
use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, FromRequest, Request, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_LENGTH;
use axum::response::{IntoResponse, Json, Response};
use bridge_proxy::InboundRequest;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

/// Catch-all: every path not claimed by a management endpoint is proxied.
pub async fn proxy(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let limit = state.config.proxy.max_body_bytes;
    let caller_address = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_default();

    let declared = request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > limit) {
        warn!(path = %request.uri().path(), limit, "Request body over limit");
        return too_large();
    }

    // A chunked body carries no length up front; the `DefaultBodyLimit`
    // installed by the router caps it while buffering.
    let (parts, body) = request.into_parts();
    let body = match Bytes::from_request(Request::from_parts(parts.clone(), body), &()).await {
        Ok(b) => b,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            warn!(path = %parts.uri.path(), limit, "Request body over limit");
            return too_large();
        }
        Err(rejection) => {
            warn!(path = %parts.uri.path(), error = %rejection, "Request body unreadable");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("Unreadable request body: {rejection}"), "status": 400 })),
            )
                .into_response();
        }
    };

    let inbound = InboundRequest {
        method: parts.method,
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers: parts.headers,
        body,
        caller_address,
    };

    let (parts, body) = state.gateway.handle(inbound).await.into_parts();
    Response::from_parts(parts, Body::from(body))
}

fn too_large() -> Response {
    (
        StatusCode::PAYLOAD_TOO_LARGE,
        Json(json!({ "error": "Request body too large", "status": 413 })),
    )
        .into_response()
}
