use bridge_core::service::Service;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use std::time::Instant;

/// Metrics collector. All counters are gated behind `enabled`.
///
/// When `enabled = false` no registry is created and every `record_*` call
/// returns immediately.
pub struct MetricsCollector {
    enabled: bool,
    started: Instant,
    registry: Option<Registry>,
    pub requests_total: Option<IntCounterVec>,
    pub request_duration: Option<HistogramVec>,
    pub proxy_errors_total: Option<IntCounterVec>,
    pub active_connections: Option<IntGauge>,
    pub service_status: Option<IntGaugeVec>,
    pub uptime_seconds: Option<IntGauge>,
    pub request_log_failures: Option<IntCounter>,
}

impl MetricsCollector {
    /// Create a new collector. When `enabled = false`, everything is None.
    pub fn new(enabled: bool) -> anyhow::Result<Self> {
        if !enabled {
            return Ok(Self {
                enabled: false,
                started: Instant::now(),
                registry: None,
                requests_total: None,
                request_duration: None,
                proxy_errors_total: None,
                active_connections: None,
                service_status: None,
                uptime_seconds: None,
                request_log_failures: None,
            });
        }

        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("bridge_requests_total", "Total proxied requests"),
            &["service", "method", "status"],
        )?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new("bridge_request_duration_seconds", "Proxied request latency")
                .buckets(vec![
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
                ]),
            &["service", "method"],
        )?;

        let proxy_errors_total = IntCounterVec::new(
            Opts::new("bridge_proxy_errors_total", "Proxy failures by class"),
            &["service", "error_type"],
        )?;

        let active_connections =
            IntGauge::new("bridge_active_connections", "In-flight proxied requests")?;

        let service_status = IntGaugeVec::new(
            Opts::new("bridge_service_status", "1 when the service is enabled"),
            &["service"],
        )?;

        let uptime_seconds = IntGauge::new("bridge_uptime_seconds", "Seconds since start")?;

        let request_log_failures = IntCounter::new(
            "bridge_request_log_failures_total",
            "Request records that could not be stored",
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(proxy_errors_total.clone()))?;
        registry.register(Box::new(active_connections.clone()))?;
        registry.register(Box::new(service_status.clone()))?;
        registry.register(Box::new(uptime_seconds.clone()))?;
        registry.register(Box::new(request_log_failures.clone()))?;

        Ok(Self {
            enabled: true,
            started: Instant::now(),
            registry: Some(registry),
            requests_total: Some(requests_total),
            request_duration: Some(request_duration),
            proxy_errors_total: Some(proxy_errors_total),
            active_connections: Some(active_connections),
            service_status: Some(service_status),
            uptime_seconds: Some(uptime_seconds),
            request_log_failures: Some(request_log_failures),
        })
    }

    /// Record a completed request (no-op when disabled).
    #[inline]
    pub fn record_request(&self, service: &str, method: &str, status: u16, duration_secs: f64) {
        if !self.enabled {
            return;
        }
        if let Some(ref counter) = self.requests_total {
            let mut buf = itoa::Buffer::new();
            let status_str = buf.format(status);
            counter.with_label_values(&[service, method, status_str]).inc();
        }
        if let Some(ref hist) = self.request_duration {
            hist.with_label_values(&[service, method]).observe(duration_secs);
        }
    }

    /// Count a failure of class `error_type` (`timeout`, `connection_error`, ...).
    #[inline]
    pub fn record_error(&self, service: &str, error_type: &str) {
        if let Some(ref counter) = self.proxy_errors_total {
            counter.with_label_values(&[service, error_type]).inc();
        }
    }

    #[inline]
    pub fn record_log_failure(&self) {
        if let Some(ref counter) = self.request_log_failures {
            counter.inc();
        }
    }

    #[inline]
    pub fn connection_opened(&self) {
        if let Some(ref gauge) = self.active_connections {
            gauge.inc();
        }
    }

    #[inline]
    pub fn connection_closed(&self) {
        if let Some(ref gauge) = self.active_connections {
            gauge.dec();
        }
    }

    /// Refresh the per-service enabled gauge from the current table.
    pub fn update_service_status(&self, services: &[Service]) {
        let Some(ref gauge) = self.service_status else {
            return;
        };
        gauge.reset();
        for svc in services {
            gauge
                .with_label_values(&[svc.name.as_str()])
                .set(i64::from(svc.enabled));
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// Render prometheus text exposition format.
    pub fn render(&self) -> String {
        let Some(ref registry) = self.registry else {
            return String::new();
        };
        if let Some(ref uptime) = self.uptime_seconds {
            uptime.set(self.uptime_secs() as i64);
        }
        let encoder = TextEncoder::new();
        let metric_families = registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or(());
        String::from_utf8(buffer).unwrap_or_default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
