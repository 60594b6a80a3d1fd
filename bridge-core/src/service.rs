use crate::error::{BridgeError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Service identifier. Assigned by the route table in registration order.
pub type ServiceId = u64;

/// Default admission budget for services registered without one.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

/// A registered backend: requests whose path starts with `path_prefix`
/// are forwarded to `target_url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,

    /// Human label, not unique.
    pub name: String,

    /// Free-form category ("web", "api", "monitoring"). Informational only.
    pub kind: String,

    /// Base URL requests are forwarded to.
    pub target_url: String,

    /// Literal path prefix this service answers for.
    pub path_prefix: String,

    /// Disabled services are invisible to routing.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Advisory; surfaced to the backend but not enforced here.
    #[serde(default)]
    pub auth_required: bool,

    /// Requests per admission window.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Registration body. Every field is optional at the type level so that
/// missing fields surface as a `Validation` error rather than a decode error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewService {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default, alias = "type")]
    pub kind: Option<String>,

    #[serde(default, alias = "targetBaseURL", alias = "target_base_url")]
    pub target_url: Option<String>,

    #[serde(default, alias = "pathPrefix")]
    pub path_prefix: Option<String>,

    #[serde(default)]
    pub enabled: Option<bool>,

    #[serde(default, alias = "authRequired")]
    pub auth_required: Option<bool>,

    #[serde(default, alias = "rateLimit")]
    pub rate_limit: Option<u32>,
}

/// Partial update: only the fields present are applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServicePatch {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default, alias = "type")]
    pub kind: Option<String>,

    #[serde(default, alias = "targetBaseURL", alias = "target_base_url")]
    pub target_url: Option<String>,

    #[serde(default, alias = "pathPrefix")]
    pub path_prefix: Option<String>,

    #[serde(default)]
    pub enabled: Option<bool>,

    #[serde(default, alias = "authRequired")]
    pub auth_required: Option<bool>,

    #[serde(default, alias = "rateLimit")]
    pub rate_limit: Option<u32>,
}

impl NewService {
    /// Convenience constructor for the four required fields.
    pub fn new(
        name: impl Into<String>,
        kind: impl Into<String>,
        target_url: impl Into<String>,
        path_prefix: impl Into<String>,
    ) -> Self {
        Self {
            name: Some(name.into()),
            kind: Some(kind.into()),
            target_url: Some(target_url.into()),
            path_prefix: Some(path_prefix.into()),
            ..Default::default()
        }
    }

    /// Validate and materialize into a `Service` with the given identity.
    pub fn into_service(self, id: ServiceId, created_at: DateTime<Utc>) -> Result<Service> {
        let (name, kind, target_url, path_prefix) =
            match (self.name, self.kind, self.target_url, self.path_prefix) {
                (Some(name), Some(kind), Some(target_url), Some(path_prefix)) => {
                    (name, kind, target_url, path_prefix)
                }
                (name, kind, target_url, path_prefix) => {
                    let missing: Vec<&str> = [
                        ("name", name.is_none()),
                        ("kind", kind.is_none()),
                        ("target_url", target_url.is_none()),
                        ("path_prefix", path_prefix.is_none()),
                    ]
                    .into_iter()
                    .filter_map(|(field, absent)| absent.then_some(field))
                    .collect();
                    return Err(BridgeError::Validation(format!(
                        "missing required fields: {}",
                        missing.join(", ")
                    )));
                }
            };

        validate_name(&name)?;
        validate_target_url(&target_url)?;
        validate_path_prefix(&path_prefix)?;

        Ok(Service {
            id,
            name,
            kind,
            target_url,
            path_prefix,
            enabled: self.enabled.unwrap_or(true),
            auth_required: self.auth_required.unwrap_or(false),
            rate_limit: self.rate_limit.unwrap_or(DEFAULT_RATE_LIMIT),
            created_at,
        })
    }
}

impl ServicePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.kind.is_none()
            && self.target_url.is_none()
            && self.path_prefix.is_none()
            && self.enabled.is_none()
            && self.auth_required.is_none()
            && self.rate_limit.is_none()
    }

    /// Validate the fields that are present.
    pub fn validate(&self) -> Result<()> {
        if let Some(ref name) = self.name {
            validate_name(name)?;
        }
        if let Some(ref url) = self.target_url {
            validate_target_url(url)?;
        }
        if let Some(ref prefix) = self.path_prefix {
            validate_path_prefix(prefix)?;
        }
        Ok(())
    }

    /// Apply present fields onto `service`. `id` and `created_at` never change.
    pub fn apply(&self, service: &mut Service) {
        if let Some(ref name) = self.name {
            service.name = name.clone();
        }
        if let Some(ref kind) = self.kind {
            service.kind = kind.clone();
        }
        if let Some(ref url) = self.target_url {
            service.target_url = url.clone();
        }
        if let Some(ref prefix) = self.path_prefix {
            service.path_prefix = prefix.clone();
        }
        if let Some(enabled) = self.enabled {
            service.enabled = enabled;
        }
        if let Some(auth) = self.auth_required {
            service.auth_required = auth;
        }
        if let Some(limit) = self.rate_limit {
            service.rate_limit = limit;
        }
    }
}

impl Service {
    /// Literal prefix match against a request path.
    #[inline]
    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(self.path_prefix.as_str())
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        Err(BridgeError::Validation("name must not be empty".into()))
    } else {
        Ok(())
    }
}

fn validate_target_url(url: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(BridgeError::Validation(format!(
            "target_url must be an http(s) URL, got {url:?}"
        )))
    }
}

fn validate_path_prefix(prefix: &str) -> Result<()> {
    if prefix.starts_with('/') {
        Ok(())
    } else {
        Err(BridgeError::Validation(format!(
            "path_prefix must start with '/', got {prefix:?}"
        )))
    }
}

fn default_true() -> bool {
    true
}

fn default_rate_limit() -> u32 {
    DEFAULT_RATE_LIMIT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_service_applies_defaults() {
        let svc = NewService::new("Backend", "api", "http://backend:8000", "/api")
            .into_service(1, Utc::now())
            .unwrap();
        assert_eq!(svc.id, 1);
        assert!(svc.enabled);
        assert!(!svc.auth_required);
        assert_eq!(svc.rate_limit, 100);
    }

    #[test]
    fn missing_fields_are_listed() {
        let body: NewService =
            serde_json::from_value(serde_json::json!({ "name": "x", "kind": "api" })).unwrap();
        let err = body.into_service(1, Utc::now()).unwrap_err();
        assert_eq!(err.status_code(), 400);
        let msg = err.to_string();
        assert!(msg.contains("target_url"), "{msg}");
        assert!(msg.contains("path_prefix"), "{msg}");
        assert!(!msg.contains("name"), "{msg}");
    }

    #[test]
    fn camel_case_and_type_aliases_accepted() {
        let body: NewService = serde_json::from_value(serde_json::json!({
            "name": "Backend",
            "type": "api",
            "targetBaseURL": "http://backend:8000",
            "pathPrefix": "/api",
            "authRequired": true,
            "rateLimit": 5
        }))
        .unwrap();
        let svc = body.into_service(3, Utc::now()).unwrap();
        assert_eq!(svc.kind, "api");
        assert_eq!(svc.target_url, "http://backend:8000");
        assert_eq!(svc.path_prefix, "/api");
        assert!(svc.auth_required);
        assert_eq!(svc.rate_limit, 5);
    }

    #[test]
    fn blank_name_rejected() {
        let err = NewService::new("  ", "api", "http://b", "/api")
            .into_service(1, Utc::now())
            .unwrap_err();
        assert!(matches!(err, BridgeError::Validation(ref m) if m.contains("name")));

        let patch = ServicePatch {
            name: Some(String::new()),
            ..Default::default()
        };
        assert!(patch.validate().is_err());
    }

    #[test]
    fn all_missing_fields_reported_together() {
        let err = NewService::default().into_service(1, Utc::now()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation failed: missing required fields: name, kind, target_url, path_prefix"
        );
    }

    #[test]
    fn relative_prefix_rejected() {
        let err = NewService::new("x", "api", "http://b", "api")
            .into_service(1, Utc::now())
            .unwrap_err();
        assert!(matches!(err, BridgeError::Validation(_)));
    }

    #[test]
    fn non_http_target_rejected() {
        let err = NewService::new("x", "api", "ftp://b", "/api")
            .into_service(1, Utc::now())
            .unwrap_err();
        assert!(matches!(err, BridgeError::Validation(_)));
    }

    #[test]
    fn patch_touches_only_present_fields() {
        let mut svc = NewService::new("Backend", "api", "http://backend:8000", "/api")
            .into_service(1, Utc::now())
            .unwrap();
        let before = svc.clone();
        let patch: ServicePatch =
            serde_json::from_value(serde_json::json!({ "enabled": false })).unwrap();
        patch.apply(&mut svc);
        assert!(!svc.enabled);
        assert_eq!(svc.name, before.name);
        assert_eq!(svc.target_url, before.target_url);
        assert_eq!(svc.created_at, before.created_at);
    }

    #[test]
    fn empty_patch_detected() {
        assert!(ServicePatch::default().is_empty());
        let patch = ServicePatch {
            rate_limit: Some(1),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn service_roundtrips_through_json() {
        let svc = NewService::new("Grafana", "monitoring", "http://grafana:3000", "/grafana")
            .into_service(6, Utc::now())
            .unwrap();
        let json = serde_json::to_value(&svc).unwrap();
        assert_eq!(json["path_prefix"], "/grafana");
        let back: Service = serde_json::from_value(json).unwrap();
        assert_eq!(back, svc);
    }
}
