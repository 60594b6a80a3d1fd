use crate::service::Service;
use std::sync::Arc;
use tracing::debug;

/// Immutable, pre-sorted view of the enabled services.
///
/// Built once per route-table write and swapped in atomically; readers
/// never take a lock. Candidates are ordered by prefix length (longest
/// first) and then by id (lowest first), so the first literal prefix hit
/// is the longest-prefix match and equal-length ties go to the earliest
/// registration.
#[derive(Debug, Default)]
pub struct RouteSnapshot {
    candidates: Vec<Arc<Service>>,
    version: u64,
}

impl RouteSnapshot {
    /// Compile a snapshot. Disabled services are dropped here and are never
    /// considered by `resolve`.
    pub fn build(services: impl IntoIterator<Item = Service>, version: u64) -> Self {
        let mut candidates: Vec<Arc<Service>> = services
            .into_iter()
            .filter(|s| s.enabled)
            .map(Arc::new)
            .collect();

        candidates.sort_by(|a, b| {
            b.path_prefix
                .len()
                .cmp(&a.path_prefix.len())
                .then(a.id.cmp(&b.id))
        });

        debug!(candidates = candidates.len(), version, "Route snapshot compiled");
        Self {
            candidates,
            version,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Longest-prefix match over enabled services.
    pub fn resolve(&self, path: &str) -> Option<Arc<Service>> {
        let hit = self.candidates.iter().find(|s| s.matches(path)).cloned();
        match hit {
            Some(ref svc) => {
                debug!(service_id = svc.id, prefix = %svc.path_prefix, path = %path, "Route resolved")
            }
            None => debug!(path = %path, "No route resolved"),
        }
        hit
    }

    /// Number of enabled services in this snapshot.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Monotonic version of the table this snapshot was compiled from.
    pub fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::NewService;
    use chrono::Utc;

    fn svc(id: u64, prefix: &str, enabled: bool) -> Service {
        let mut s = NewService::new(format!("svc-{id}"), "api", "http://backend:8000", prefix)
            .into_service(id, Utc::now())
            .unwrap();
        s.enabled = enabled;
        s
    }

    #[test]
    fn longest_prefix_wins() {
        let snap = RouteSnapshot::build(
            vec![svc(1, "/api", true), svc(2, "/api/admin", true), svc(3, "/", true)],
            1,
        );
        assert_eq!(snap.resolve("/api/admin/users").unwrap().id, 2);
        assert_eq!(snap.resolve("/api/projects").unwrap().id, 1);
        assert_eq!(snap.resolve("/other").unwrap().id, 3);
    }

    #[test]
    fn disabled_service_never_matches() {
        let snap = RouteSnapshot::build(vec![svc(1, "/grafana", false)], 1);
        assert!(snap.resolve("/grafana/d/abc").is_none());
        assert!(snap.is_empty());
    }

    #[test]
    fn disabled_longer_prefix_falls_back_to_shorter() {
        let snap = RouteSnapshot::build(vec![svc(1, "/api", true), svc(2, "/api/v2", false)], 1);
        assert_eq!(snap.resolve("/api/v2/items").unwrap().id, 1);
    }

    #[test]
    fn equal_length_tie_goes_to_lowest_id() {
        let snap = RouteSnapshot::build(vec![svc(9, "/app", true), svc(4, "/app", true)], 1);
        assert_eq!(snap.resolve("/app/index.html").unwrap().id, 4);
    }

    #[test]
    fn prefix_is_literal_not_segment_aware() {
        let snap = RouteSnapshot::build(vec![svc(1, "/api", true)], 1);
        assert_eq!(snap.resolve("/apiary").unwrap().id, 1);
    }

    #[test]
    fn empty_snapshot_resolves_nothing() {
        let snap = RouteSnapshot::empty();
        assert!(snap.resolve("/").is_none());
        assert_eq!(snap.version(), 0);
    }
}
