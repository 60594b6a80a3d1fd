pub mod accountant;
pub mod metrics;

pub use accountant::{Accountant, ServiceStats, Stats};
pub use metrics::MetricsCollector;
