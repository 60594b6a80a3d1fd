use crate::service::ServiceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One proxied call, written once and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    /// `None` when no service matched.
    pub service_id: Option<ServiceId>,
    pub method: String,
    pub path: String,
    pub status_code: u16,
    pub response_time_seconds: f64,
    #[serde(default)]
    pub caller_agent: String,
    #[serde(default)]
    pub caller_address: String,
    pub timestamp: DateTime<Utc>,
}

impl RequestRecord {
    /// Create a record stamped with the current time; fill the caller fields
    /// before handing it to the accountant.
    pub fn new(
        service_id: Option<ServiceId>,
        method: impl Into<String>,
        path: impl Into<String>,
        status_code: u16,
        response_time_seconds: f64,
    ) -> Self {
        Self {
            service_id,
            method: method.into(),
            path: path.into(),
            status_code,
            response_time_seconds,
            caller_agent: String::new(),
            caller_address: String::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_caller(mut self, agent: impl Into<String>, address: impl Into<String>) -> Self {
        self.caller_agent = agent.into();
        self.caller_address = address.into();
        self
    }

    /// Compact JSON line for the request log file.
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_line_is_single_line() {
        let rec = RequestRecord::new(Some(2), "GET", "/api/projects", 200, 0.012)
            .with_caller("curl/8.0", "10.0.0.9:51234");
        let line = rec.to_json_line();
        assert!(!line.contains('\n'));
        let back: RequestRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn unmatched_record_serializes_null_service() {
        let rec = RequestRecord::new(None, "GET", "/nowhere", 404, 0.0);
        let json = serde_json::to_value(&rec).unwrap();
        assert!(json["service_id"].is_null());
    }
}
