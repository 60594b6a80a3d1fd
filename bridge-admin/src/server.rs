use crate::handlers;
use bridge_core::config::GatewayConfig;
use bridge_observability::{Accountant, MetricsCollector};
use bridge_proxy::Gateway;
use bridge_store::{RequestLog, RouteTable};
use axum::{
    Router as AxumRouter,
    extract::DefaultBodyLimit,
    routing::{get, put},
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Shared state for every handler.
pub struct AppState {
    pub table: Arc<dyn RouteTable>,
    pub accountant: Arc<Accountant>,
    pub metrics: Arc<MetricsCollector>,
    pub gateway: Arc<Gateway>,
    pub config: Arc<GatewayConfig>,
    pub started: Instant,
}

impl AppState {
    /// Wire the accountant, metrics and front door around an opened table
    /// and request log.
    pub fn new(
        table: Arc<dyn RouteTable>,
        log: Arc<dyn RequestLog>,
        config: GatewayConfig,
    ) -> anyhow::Result<Arc<Self>> {
        let metrics = Arc::new(MetricsCollector::new(config.observability.prometheus.enabled)?);
        let accountant = Arc::new(Accountant::new(log, metrics.clone()));
        let gateway = Arc::new(Gateway::new(table.clone(), accountant.clone(), &config.proxy)?);
        Ok(Arc::new(Self {
            table,
            accountant,
            metrics,
            gateway,
            config: Arc::new(config),
            started: Instant::now(),
        }))
    }
}

/// Build the axum router: management endpoints first, the proxy catch-all
/// as the fallback for everything else.
pub fn build_router(state: Arc<AppState>) -> AxumRouter {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let management = AxumRouter::new()
        .route(
            "/services",
            get(handlers::services::list_services).post(handlers::services::create_service),
        )
        .route(
            "/services/{id}",
            put(handlers::services::update_service)
                .get(handlers::services::get_service)
                .delete(handlers::services::delete_service),
        )
        .route("/stats", get(handlers::stats::get_stats))
        .route("/health", get(handlers::health::health_check))
        .layer(cors);

    let mut app = AxumRouter::new().merge(management);
    if state.metrics.is_enabled() {
        let path = state.config.observability.prometheus.path.clone();
        info!(path = %path, "Prometheus endpoint enabled");
        app = app.route(&path, get(handlers::metrics::metrics_handler));
    }

    let body_limit = DefaultBodyLimit::max(state.config.proxy.max_body_bytes);
    app.fallback(handlers::proxy::proxy)
        .layer(body_limit)
        .with_state(state)
}
