//! Per-request orchestration: resolve, admit, forward, account, respond.
//!
//! An unresolved path is answered with 404 straight away and leaves no
//! request record. Every resolved request ends in exactly one record and one
//! response, whatever the forwarding outcome. If the caller goes away first,
//! the server drops the future returned by [`Gateway::handle`]; that drops the
//! in-flight upstream call and the [`InFlight`] guard notes the cancellation.

use crate::forwarder::{Forwarder, InboundRequest, UpstreamResponse};
use crate::rate_limit::{Admission, RateLimiter};
use bridge_core::config::ProxyConfig;
use bridge_core::error::{BridgeError, Result};
use bridge_core::record::RequestRecord;
use bridge_core::service::{Service, ServiceId};
use bridge_observability::{Accountant, MetricsCollector};
use bridge_store::RouteTable;
use bytes::Bytes;
use http::header::{ALLOW, CONTENT_TYPE, HeaderValue, RETRY_AFTER};
use http::{HeaderMap, Method, Response, StatusCode};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Label used for metrics when no service matched.
const UNMATCHED: &str = "unmatched";

pub struct Gateway {
    table: Arc<dyn RouteTable>,
    forwarder: Forwarder,
    limiter: Option<RateLimiter>,
    accountant: Arc<Accountant>,
}

impl Gateway {
    pub fn new(
        table: Arc<dyn RouteTable>,
        accountant: Arc<Accountant>,
        config: &ProxyConfig,
    ) -> Result<Self> {
        let limiter = config
            .enforce_rate_limit
            .then(|| RateLimiter::new(config.rate_limit_window()));
        Ok(Self {
            table,
            forwarder: Forwarder::new(config.upstream_timeout())?,
            limiter,
            accountant,
        })
    }

    /// Release per-service front-door state once a service is deleted.
    pub fn forget_service(&self, id: ServiceId) {
        if let Some(ref limiter) = self.limiter {
            limiter.forget(id);
        }
    }

    /// Services currently holding a rate-limit counter.
    pub fn rate_limited_services(&self) -> usize {
        self.limiter.as_ref().map_or(0, RateLimiter::tracked)
    }

    fn metrics(&self) -> &MetricsCollector {
        self.accountant.metrics()
    }

    pub fn is_proxied_method(method: &Method) -> bool {
        matches!(
            *method,
            Method::GET | Method::POST | Method::PUT | Method::DELETE | Method::PATCH
        )
    }

    pub async fn handle(&self, req: InboundRequest) -> Response<Bytes> {
        if !Self::is_proxied_method(&req.method) {
            debug!(method = %req.method, path = %req.path, "Method not proxied");
            let mut resp = json_response(
                StatusCode::METHOD_NOT_ALLOWED,
                serde_json::json!({ "error": "Method not allowed", "status": 405 }),
            );
            resp.headers_mut().insert(
                ALLOW,
                HeaderValue::from_static("GET, POST, PUT, DELETE, PATCH"),
            );
            return resp;
        }

        let snapshot = self.table.snapshot();
        let Some(service) = snapshot.resolve(&req.path) else {
            debug!(method = %req.method, path = %req.path, "No service for path");
            self.metrics().record_error(UNMATCHED, "service_not_found");
            return json_response(
                StatusCode::NOT_FOUND,
                serde_json::json!({ "error": "Service not found" }),
            );
        };

        let started = Instant::now();
        let mut guard = InFlight::new(self.metrics(), &service, &req);

        let resp = match self.admit(&service) {
            Err(limited) => limited,
            Ok(()) => match self.forwarder.forward(&service, &req).await {
                Ok(upstream) => passthrough(upstream),
                Err(e) => self.failure(&service, &e),
            },
        };
        guard.complete();

        let elapsed = started.elapsed();
        let status = resp.status().as_u16();
        let record = RequestRecord::new(
            Some(service.id),
            req.method.as_str(),
            req.path.as_str(),
            status,
            elapsed.as_secs_f64(),
        )
        .with_caller(req.caller_agent(), req.caller_address.as_str());
        self.accountant.record(record);
        self.metrics()
            .record_request(&service.name, req.method.as_str(), status, elapsed.as_secs_f64());

        info!(
            method = %req.method,
            path = %req.path,
            target = %service.target_url,
            status,
            latency_ms = elapsed.as_millis() as u64,
            "Proxied request"
        );
        resp
    }

    /// Admission control. `Err` holds the ready 429 response.
    fn admit(&self, service: &Service) -> std::result::Result<(), Response<Bytes>> {
        let Some(ref limiter) = self.limiter else {
            return Ok(());
        };
        match limiter.check(service) {
            Admission::Allowed { .. } => Ok(()),
            Admission::Limited { limit, retry_after_secs } => {
                warn!(service_id = service.id, limit, "Rate limit exceeded");
                let err = BridgeError::RateLimited(format!(
                    "{} allows {limit} requests per window",
                    service.name
                ));
                self.metrics().record_error(&service.name, err.kind());
                let mut resp = error_response(&err);
                let mut buf = itoa::Buffer::new();
                if let Ok(v) = HeaderValue::from_str(buf.format(retry_after_secs)) {
                    resp.headers_mut().insert(RETRY_AFTER, v);
                }
                Err(resp)
            }
        }
    }

    fn failure(&self, service: &Service, e: &BridgeError) -> Response<Bytes> {
        match e {
            BridgeError::UpstreamTimeout(_) | BridgeError::UpstreamUnreachable(_) => {
                warn!(service_id = service.id, error = %e, class = e.kind(), "Forward failed");
            }
            _ => error!(service_id = service.id, error = %e, class = e.kind(), "Forward failed"),
        }
        self.metrics().record_error(&service.name, e.kind());
        error_response(e)
    }
}

/// Tracks one in-flight forward. Dropped without `complete()` means the
/// caller went away and the handler future was cancelled.
struct InFlight<'a> {
    metrics: &'a MetricsCollector,
    service: Arc<Service>,
    method: Method,
    path: String,
    started: Instant,
    done: bool,
}

impl<'a> InFlight<'a> {
    fn new(metrics: &'a MetricsCollector, service: &Arc<Service>, req: &InboundRequest) -> Self {
        metrics.connection_opened();
        Self {
            metrics,
            service: service.clone(),
            method: req.method.clone(),
            path: req.path.clone(),
            started: Instant::now(),
            done: false,
        }
    }

    fn complete(&mut self) {
        self.done = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.metrics.connection_closed();
        if !self.done {
            warn!(
                service_id = self.service.id,
                method = %self.method,
                path = %self.path,
                elapsed_ms = self.started.elapsed().as_millis() as u64,
                "Caller disconnected, upstream call cancelled"
            );
            self.metrics.record_error(&self.service.name, "cancelled");
        }
    }
}

fn passthrough(upstream: UpstreamResponse) -> Response<Bytes> {
    let mut resp = Response::new(upstream.body);
    *resp.status_mut() = upstream.status;
    *resp.headers_mut() = upstream.headers;
    resp
}

fn error_response(e: &BridgeError) -> Response<Bytes> {
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut resp = Response::new(Bytes::from(e.to_json_body()));
    *resp.status_mut() = status;
    resp.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    resp
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Bytes> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let mut resp = Response::new(Bytes::from(body.to_string()));
    *resp.status_mut() = status;
    *resp.headers_mut() = headers;
    resp
}
