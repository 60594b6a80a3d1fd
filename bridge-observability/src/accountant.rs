use crate::metrics::MetricsCollector;
use bridge_core::error::Result;
use bridge_core::record::RequestRecord;
use bridge_core::service::{Service, ServiceId};
use bridge_store::{RequestLog, RouteTable};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Aggregate view over the request log.
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub total_services: usize,
    pub active_services: usize,
    /// Records in the window, including those with no matching service.
    pub request_count: usize,
    /// Mean latency in seconds over the same records; 0 when there are none.
    pub average_response_time: f64,
    pub window_seconds: u64,
    pub uptime_seconds: u64,
    pub requests_by_service: Vec<ServiceStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub service_id: ServiceId,
    pub service: String,
    pub enabled: bool,
    pub request_count: usize,
    pub avg_response_time: f64,
}

/// Records proxied calls and computes [`Stats`].
pub struct Accountant {
    log: Arc<dyn RequestLog>,
    metrics: Arc<MetricsCollector>,
}

impl Accountant {
    pub fn new(log: Arc<dyn RequestLog>, metrics: Arc<MetricsCollector>) -> Self {
        Self { log, metrics }
    }

    /// Append `record`. Never fails: a storage error is logged, counted and
    /// dropped so the caller's response is unaffected.
    pub fn record(&self, record: RequestRecord) {
        let service_id = record.service_id;
        let status = record.status_code;
        if let Err(e) = self.log.append(record) {
            warn!(error = %e, service_id = ?service_id, status, "Request record dropped");
            self.metrics.record_log_failure();
        }
    }

    /// Aggregate the records of the last `window`, left-joined against the
    /// current service list so idle services appear with a zero count.
    pub fn stats(&self, table: &dyn RouteTable, window: Duration) -> Result<Stats> {
        let services = table.list()?;
        let cutoff = chrono::Duration::from_std(window)
            .ok()
            .and_then(|w| Utc::now().checked_sub_signed(w))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let records = self.log.since(cutoff)?;
        Ok(aggregate(
            &services,
            &records,
            window.as_secs(),
            self.metrics.uptime_secs(),
        ))
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }
}

fn aggregate(
    services: &[Service],
    records: &[RequestRecord],
    window_seconds: u64,
    uptime_seconds: u64,
) -> Stats {
    let mut per_service: HashMap<ServiceId, (usize, f64)> = HashMap::new();
    let mut total_latency = 0.0;
    for r in records {
        total_latency += r.response_time_seconds;
        if let Some(id) = r.service_id {
            let entry = per_service.entry(id).or_default();
            entry.0 += 1;
            entry.1 += r.response_time_seconds;
        }
    }

    let mut requests_by_service: Vec<ServiceStats> = services
        .iter()
        .map(|s| {
            let (count, sum) = per_service.get(&s.id).copied().unwrap_or_default();
            ServiceStats {
                service_id: s.id,
                service: s.name.clone(),
                enabled: s.enabled,
                request_count: count,
                avg_response_time: mean(sum, count),
            }
        })
        .collect();
    requests_by_service.sort_by(|a, b| {
        b.request_count
            .cmp(&a.request_count)
            .then(a.service_id.cmp(&b.service_id))
    });

    Stats {
        total_services: services.len(),
        active_services: services.iter().filter(|s| s.enabled).count(),
        request_count: records.len(),
        average_response_time: mean(total_latency, records.len()),
        window_seconds,
        uptime_seconds,
        requests_by_service,
    }
}

fn mean(sum: f64, count: usize) -> f64 {
    if count == 0 { 0.0 } else { sum / count as f64 }
}
