pub mod forwarder;
pub mod gateway;
pub mod rate_limit;

pub use forwarder::{Forwarder, InboundRequest, UpstreamResponse};
pub use gateway::Gateway;
pub use rate_limit::{Admission, RateLimiter};
