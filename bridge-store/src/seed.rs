use crate::table::RouteTable;
use bridge_core::error::Result;
use bridge_core::service::NewService;
use tracing::info;

/// The sample deployment registered on first start.
pub fn default_services() -> Vec<NewService> {
    let entry = |name: &str, kind: &str, url: &str, prefix: &str, auth: bool, limit: u32| {
        let mut svc = NewService::new(name, kind, url, prefix);
        svc.auth_required = Some(auth);
        svc.rate_limit = Some(limit);
        svc
    };

    vec![
        entry("Frontend App", "web", "http://frontend:80", "/app", false, 1000),
        entry("Backend API", "api", "http://backend-api:8000", "/api", false, 1000),
        entry("Admin Interface", "web", "http://admin-interface:80", "/admin", true, 500),
        entry("Health Check API", "api", "http://healthcheck:5000", "/health", false, 200),
        entry("Prometheus Metrics", "monitoring", "http://prometheus:9090", "/prometheus", true, 100),
        entry("Grafana Dashboard", "monitoring", "http://grafana:3000", "/grafana", true, 100),
    ]
}

/// Register [`default_services`] when `table` is empty. Returns how many
/// services were added.
pub fn seed_if_empty(table: &dyn RouteTable) -> Result<usize> {
    if !table.is_empty() {
        return Ok(0);
    }
    let defaults = default_services();
    let count = defaults.len();
    for svc in defaults {
        table.add(svc)?;
    }
    info!(count, "Default services seeded");
    Ok(count)
}
