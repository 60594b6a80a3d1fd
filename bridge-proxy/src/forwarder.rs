use bridge_core::error::{BridgeError, Result};
use bridge_core::service::Service;
use bytes::Bytes;
use http::header::{CONTENT_LENGTH, HOST, HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Headers that describe a single connection and are never relayed.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
    "proxy-connection",
];

/// Header telling the backend that the matched service is flagged as
/// requiring authentication.
pub const AUTH_REQUIRED_HEADER: &str = "x-bridge-auth-required";

/// An inbound call, fully buffered, as seen by the front door.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub caller_address: String,
}

impl InboundRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            caller_address: String::new(),
        }
    }

    pub fn caller_agent(&self) -> &str {
        self.headers
            .get(http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }
}

/// What the backend sent back.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Executes one outbound call per inbound request. No retries, no redirect
/// following, a single deadline over the whole round trip.
#[derive(Clone)]
pub struct Forwarder {
    client: reqwest::Client,
}

impl Forwarder {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .no_gzip()
            .build()
            .map_err(|e| BridgeError::Internal(format!("http client: {e}")))?;
        Ok(Self { client })
    }

    /// Forward `req` to `service` and return the backend's answer verbatim.
    ///
    /// Errors carry the failure class: `UpstreamTimeout` (504),
    /// `UpstreamUnreachable` (502) or `UpstreamProtocol` (500).
    pub async fn forward(&self, service: &Service, req: &InboundRequest) -> Result<UpstreamResponse> {
        let url = upstream_url(service, &req.path, req.query.as_deref());
        let mut headers = relay_headers(&req.headers);
        headers.remove(HOST);
        if service.auth_required {
            headers.insert(
                HeaderName::from_static(AUTH_REQUIRED_HEADER),
                HeaderValue::from_static("true"),
            );
        }

        debug!(method = %req.method, url = %url, "Forwarding upstream");

        let mut builder = self.client.request(req.method.clone(), &url).headers(headers);
        if !req.body.is_empty() {
            builder = builder.body(req.body.clone());
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| classify(&e, service, &url))?;
        let status = resp.status();
        let headers = relay_headers(resp.headers());
        let body = resp.bytes().await.map_err(|e| classify(&e, service, &url))?;

        Ok(UpstreamResponse { status, headers, body })
    }
}

/// `target_url` without its trailing slash, then `/`, then whatever follows
/// the prefix with its leading slash removed, then the query string.
pub fn upstream_url(service: &Service, path: &str, query: Option<&str>) -> String {
    let base = service.target_url.trim_end_matches('/');
    let rest = path
        .strip_prefix(service.path_prefix.as_str())
        .unwrap_or(path)
        .trim_start_matches('/');
    match query {
        Some(q) if !q.is_empty() => format!("{base}/{rest}?{q}"),
        _ => format!("{base}/{rest}"),
    }
}

/// Copy `headers` minus hop-by-hop fields and `content-length`.
pub fn relay_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name.as_str()) || *name == CONTENT_LENGTH {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

fn classify(e: &reqwest::Error, service: &Service, url: &str) -> BridgeError {
    if e.is_timeout() {
        warn!(service_id = service.id, url = %url, "Upstream timed out");
        BridgeError::UpstreamTimeout(format!("{} did not respond in time", service.name))
    } else if e.is_connect() {
        warn!(service_id = service.id, url = %url, error = %e, "Upstream unreachable");
        BridgeError::UpstreamUnreachable(format!("{} is unreachable", service.name))
    } else {
        warn!(service_id = service.id, url = %url, error = %e, "Upstream request failed");
        BridgeError::UpstreamProtocol(format!("{}: {e}", service.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::service::NewService;
    use chrono::Utc;

    fn svc(target: &str, prefix: &str) -> Service {
        NewService::new("Backend", "api", target, prefix)
            .into_service(1, Utc::now())
            .unwrap()
    }

    #[test]
    fn prefix_is_stripped() {
        let s = svc("http://backend:8000", "/api");
        assert_eq!(upstream_url(&s, "/api/projects/7", None), "http://backend:8000/projects/7");
    }

    #[test]
    fn trailing_slash_on_target_collapses() {
        let s = svc("http://backend:8000/", "/api/");
        assert_eq!(upstream_url(&s, "/api/projects", None), "http://backend:8000/projects");
    }

    #[test]
    fn bare_prefix_maps_to_root() {
        let s = svc("http://backend:8000", "/api");
        assert_eq!(upstream_url(&s, "/api", None), "http://backend:8000/");
    }

    #[test]
    fn query_is_kept() {
        let s = svc("http://backend:8000/v1", "/api");
        assert_eq!(
            upstream_url(&s, "/api/search", Some("q=rust&page=2")),
            "http://backend:8000/v1/search?q=rust&page=2"
        );
        assert_eq!(upstream_url(&s, "/api/search", Some("")), "http://backend:8000/v1/search");
    }

    #[test]
    fn hop_by_hop_headers_dropped() {
        let mut h = HeaderMap::new();
        h.insert("connection", HeaderValue::from_static("keep-alive"));
        h.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        h.insert("content-length", HeaderValue::from_static("12"));
        h.insert("x-request-id", HeaderValue::from_static("abc"));
        h.append("set-cookie", HeaderValue::from_static("a=1"));
        h.append("set-cookie", HeaderValue::from_static("b=2"));

        let out = relay_headers(&h);
        assert!(out.get("connection").is_none());
        assert!(out.get("transfer-encoding").is_none());
        assert!(out.get("content-length").is_none());
        assert_eq!(out.get("x-request-id").unwrap(), "abc");
        assert_eq!(out.get_all("set-cookie").iter().count(), 2);
    }

    #[test]
    fn caller_agent_from_user_agent() {
        let mut req = InboundRequest::new(Method::GET, "/x");
        assert_eq!(req.caller_agent(), "");
        req.headers.insert(http::header::USER_AGENT, HeaderValue::from_static("curl/8.0"));
        assert_eq!(req.caller_agent(), "curl/8.0");
    }
}
