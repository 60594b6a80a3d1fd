use bridge_core::service::{Service, ServiceId};
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed { limit: u32, remaining: u32 },
    Limited { limit: u32, retry_after_secs: u64 },
}

/// Fixed-window request counter per service, budget taken from
/// `Service::rate_limit`. A budget of 0 means unlimited.
pub struct RateLimiter {
    window: Duration,
    /// Counters: service id -> (count, window_start)
    counters: DashMap<ServiceId, (u32, Instant)>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window: window.max(Duration::from_secs(1)),
            counters: DashMap::new(),
        }
    }

    /// Drop the counter of a service that left the table.
    pub fn forget(&self, id: ServiceId) {
        self.counters.remove(&id);
    }

    /// Number of services with a live counter.
    pub fn tracked(&self) -> usize {
        self.counters.len()
    }

    pub fn check(&self, service: &Service) -> Admission {
        self.check_at(service, Instant::now())
    }

    fn check_at(&self, service: &Service, now: Instant) -> Admission {
        let limit = service.rate_limit;
        if limit == 0 {
            return Admission::Allowed { limit, remaining: 0 };
        }

        let mut entry = self.counters.entry(service.id).or_insert((0, now));
        let (ref mut count, ref mut window_start) = *entry;

        // Window expired: start a new one.
        if now.duration_since(*window_start) >= self.window {
            *count = 0;
            *window_start = now;
        }

        if *count >= limit {
            let elapsed = now.duration_since(*window_start);
            let left = self.window.saturating_sub(elapsed);
            let retry_after_secs = left.as_secs() + u64::from(left.subsec_nanos() > 0);
            return Admission::Limited {
                limit,
                retry_after_secs: retry_after_secs.max(1),
            };
        }

        *count += 1;
        Admission::Allowed {
            limit,
            remaining: limit - *count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::service::NewService;
    use chrono::Utc;

    fn svc(id: ServiceId, limit: u32) -> Service {
        let mut s = NewService::new("s", "api", "http://b:80", "/s")
            .into_service(id, Utc::now())
            .unwrap();
        s.rate_limit = limit;
        s
    }

    #[test]
    fn budget_exhausts_then_resets() {
        let rl = RateLimiter::new(Duration::from_secs(60));
        let s = svc(1, 2);
        let t0 = Instant::now();
        assert_eq!(rl.check_at(&s, t0), Admission::Allowed { limit: 2, remaining: 1 });
        assert_eq!(rl.check_at(&s, t0), Admission::Allowed { limit: 2, remaining: 0 });
        assert_eq!(
            rl.check_at(&s, t0 + Duration::from_secs(10)),
            Admission::Limited { limit: 2, retry_after_secs: 50 }
        );
        assert!(matches!(
            rl.check_at(&s, t0 + Duration::from_secs(60)),
            Admission::Allowed { remaining: 1, .. }
        ));
    }

    #[test]
    fn services_counted_independently() {
        let rl = RateLimiter::new(Duration::from_secs(60));
        let a = svc(1, 1);
        let b = svc(2, 1);
        assert!(matches!(rl.check(&a), Admission::Allowed { .. }));
        assert!(matches!(rl.check(&a), Admission::Limited { .. }));
        assert!(matches!(rl.check(&b), Admission::Allowed { .. }));
    }

    #[test]
    fn forgotten_service_loses_its_counter() {
        let rl = RateLimiter::new(Duration::from_secs(60));
        let a = svc(1, 1);
        let b = svc(2, 1);
        rl.check(&a);
        rl.check(&b);
        assert_eq!(rl.tracked(), 2);

        rl.forget(a.id);
        assert_eq!(rl.tracked(), 1);
        assert!(matches!(rl.check(&a), Admission::Allowed { remaining: 0, .. }));
    }

    #[test]
    fn zero_budget_is_unlimited() {
        let rl = RateLimiter::new(Duration::from_secs(60));
        let s = svc(1, 0);
        for _ in 0..1000 {
            assert!(matches!(rl.check(&s), Admission::Allowed { .. }));
        }
    }
}
