pub mod config;
pub mod error;
pub mod record;
pub mod resolver;
pub mod service;

pub use config::GatewayConfig;
pub use error::BridgeError;
pub use record::RequestRecord;
pub use resolver::RouteSnapshot;
pub use service::{NewService, Service, ServiceId, ServicePatch};
