pub mod persist;
pub mod request_log;
pub mod seed;
pub mod table;

pub use request_log::{MemoryRequestLog, RequestLog, RequestLogFile};
pub use table::{MemoryRouteTable, RouteTable};
