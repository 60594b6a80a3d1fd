use crate::persist::{PersistedState, StateFile};
use arc_swap::ArcSwap;
use bridge_core::error::{BridgeError, Result};
use bridge_core::resolver::RouteSnapshot;
use bridge_core::service::{NewService, Service, ServiceId, ServicePatch};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Durable set of registered services.
///
/// Readers on the proxy path only call [`RouteTable::snapshot`], which never
/// blocks behind a writer. Management writes go through `add` / `update` /
/// `remove` and become visible to the next snapshot once they return.
pub trait RouteTable: Send + Sync {
    /// All services, enabled or not, ordered by name then id.
    fn list(&self) -> Result<Vec<Service>>;

    fn get(&self, id: ServiceId) -> Result<Service>;

    /// Register a service and return its newly assigned id.
    fn add(&self, new: NewService) -> Result<ServiceId>;

    /// Apply the fields present in `patch`. Unknown id is `ServiceNotFound`.
    fn update(&self, id: ServiceId, patch: ServicePatch) -> Result<Service>;

    fn remove(&self, id: ServiceId) -> Result<()>;

    /// Current compiled view of the enabled services.
    fn snapshot(&self) -> Arc<RouteSnapshot>;

    /// Number of registered services, enabled or not.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Verify the backing storage can still be read and written.
    fn health_check(&self) -> Result<usize>;
}

/// In-memory route table with optional JSON file persistence.
pub struct MemoryRouteTable {
    /// Source of truth: all registered services by id.
    services: DashMap<ServiceId, Service>,

    /// Compiled resolver view, swapped after each committed write.
    snapshot: ArcSwap<RouteSnapshot>,

    next_id: AtomicU64,
    version: AtomicU64,

    /// Serializes writers so persist + commit + rebuild is one step.
    write_lock: Mutex<()>,

    state_file: Option<StateFile>,
}

impl MemoryRouteTable {
    /// A table that lives only in memory.
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
            snapshot: ArcSwap::from_pointee(RouteSnapshot::empty()),
            next_id: AtomicU64::new(1),
            version: AtomicU64::new(0),
            write_lock: Mutex::new(()),
            state_file: None,
        }
    }

    /// A table backed by `file`. Existing state is restored; a malformed
    /// file is an error rather than an empty table.
    pub fn with_state_file(file: StateFile) -> Result<Self> {
        let mut table = Self::new();
        if let Some(state) = file.load()? {
            let mut max_id = 0;
            for svc in state.services {
                max_id = max_id.max(svc.id);
                table.services.insert(svc.id, svc);
            }
            table
                .next_id
                .store(state.next_id.max(max_id + 1), Ordering::SeqCst);
        }
        table.state_file = Some(file);
        table.rebuild();
        Ok(table)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| BridgeError::Internal("route table write lock poisoned".into()))
    }

    /// Persist the would-be state. Called before the in-memory commit so a
    /// failed write leaves the table unchanged.
    fn persist(&self, services: Vec<Service>, next_id: ServiceId) -> Result<()> {
        let Some(ref file) = self.state_file else {
            return Ok(());
        };
        let mut services = services;
        services.sort_by_key(|s| s.id);
        file.save(&PersistedState { next_id, services }).inspect_err(|e| {
            warn!(error = %e, "Route table write not persisted");
        })
    }

    fn current(&self) -> Vec<Service> {
        self.services.iter().map(|e| e.value().clone()).collect()
    }

    fn rebuild(&self) {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let snap = RouteSnapshot::build(self.current(), version);
        self.snapshot.store(Arc::new(snap));
    }
}

impl Default for MemoryRouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteTable for MemoryRouteTable {
    fn list(&self) -> Result<Vec<Service>> {
        let mut all = self.current();
        all.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(all)
    }

    fn get(&self, id: ServiceId) -> Result<Service> {
        self.services
            .get(&id)
            .map(|s| s.value().clone())
            .ok_or_else(|| BridgeError::ServiceNotFound(id.to_string()))
    }

    fn add(&self, new: NewService) -> Result<ServiceId> {
        let _guard = self.lock()?;
        let id = self.next_id.load(Ordering::SeqCst);
        let svc = new.into_service(id, Utc::now())?;

        let mut next = self.current();
        next.push(svc.clone());
        self.persist(next, id + 1)?;

        info!(service_id = id, name = %svc.name, prefix = %svc.path_prefix, target = %svc.target_url, "Service registered");
        self.services.insert(id, svc);
        self.next_id.store(id + 1, Ordering::SeqCst);
        self.rebuild();
        Ok(id)
    }

    fn update(&self, id: ServiceId, patch: ServicePatch) -> Result<Service> {
        let _guard = self.lock()?;
        let mut svc = self.get(id)?;
        patch.validate()?;
        patch.apply(&mut svc);

        let next: Vec<Service> = self
            .current()
            .into_iter()
            .map(|s| if s.id == id { svc.clone() } else { s })
            .collect();
        self.persist(next, self.next_id.load(Ordering::SeqCst))?;

        info!(service_id = id, enabled = svc.enabled, prefix = %svc.path_prefix, "Service updated");
        self.services.insert(id, svc.clone());
        self.rebuild();
        Ok(svc)
    }

    fn remove(&self, id: ServiceId) -> Result<()> {
        let _guard = self.lock()?;
        if !self.services.contains_key(&id) {
            return Err(BridgeError::ServiceNotFound(id.to_string()));
        }
        let next: Vec<Service> = self.current().into_iter().filter(|s| s.id != id).collect();
        self.persist(next, self.next_id.load(Ordering::SeqCst))?;

        info!(service_id = id, "Service removed");
        self.services.remove(&id);
        self.rebuild();
        Ok(())
    }

    fn snapshot(&self) -> Arc<RouteSnapshot> {
        self.snapshot.load_full()
    }

    fn len(&self) -> usize {
        self.services.len()
    }

    fn health_check(&self) -> Result<usize> {
        if let Some(ref file) = self.state_file {
            file.check_writable()?;
        }
        Ok(self.services.len())
    }
}
