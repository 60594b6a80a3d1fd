use thiserror::Error;

/// Unified error type for Bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("No route for path: {0}")]
    RouteNotFound(String),

    #[error("Gateway timeout: {0}")]
    UpstreamTimeout(String),

    #[error("Bad gateway: {0}")]
    UpstreamUnreachable(String),

    #[error("Upstream error: {0}")]
    UpstreamProtocol(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Internal: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    /// Map to HTTP status code.
    pub fn status_code(&self) -> u16 {
        match self {
            BridgeError::Validation(_) => 400,
            BridgeError::ServiceNotFound(_) => 404,
            BridgeError::RouteNotFound(_) => 404,
            BridgeError::UpstreamTimeout(_) => 504,
            BridgeError::UpstreamUnreachable(_) => 502,
            BridgeError::UpstreamProtocol(_) => 500,
            BridgeError::RateLimited(_) => 429,
            BridgeError::Store(_) => 503,
            _ => 500,
        }
    }

    /// Short label used for the `error_type` metric dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Validation(_) => "validation",
            BridgeError::ServiceNotFound(_) | BridgeError::RouteNotFound(_) => "service_not_found",
            BridgeError::UpstreamTimeout(_) => "timeout",
            BridgeError::UpstreamUnreachable(_) => "connection_error",
            BridgeError::RateLimited(_) => "rate_limited",
            BridgeError::Store(_) => "store_error",
            _ => "internal_error",
        }
    }

    /// JSON error body.
    pub fn to_json_body(&self) -> Vec<u8> {
        serde_json::json!({
            "error": self.to_string(),
            "status": self.status_code(),
        })
        .to_string()
        .into_bytes()
    }
}
