// vartree
// SPDX-License-Identifier: MPL-2.0

//! A session: one variable store, its connected clients, and the watch
//! table driving change delivery to them (spec.md §3, §4.8).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use vartree_core::sync::{Mutex, RwLock};
use vartree_core::{trace_read_lock, trace_write_lock};
use vartree_storage::Backend;
use vartree_store::path::{resolve, Path, PathCache, ResolveContext, Segment};
use vartree_store::VariableStore;
use vartree_types::{VarId, VartreeError, Variable};

use crate::connection::{ConnId, Connection};
use crate::watch::WatchTable;

pub struct Session {
    pub id: String,
    store: VariableStore,
    connections: RwLock<hashbrown::HashMap<ConnId, Arc<Connection>>>,
    watch_table: Mutex<WatchTable>,
    paths: PathCache,
    next_conn_id: AtomicU64,
    last_active: Mutex<Instant>,
    shutdown: Notify,
}

impl Session {
    /// Opens the variable store behind `backend` and returns a fresh
    /// session with no connections. `refresh_interval` is carried by the
    /// caller's `ChangeDetector`, not stored here (spec.md §4.6).
    pub async fn open(
        id: String,
        backend: Arc<dyn Backend>,
        _refresh_interval: Duration,
    ) -> Result<Self, VartreeError> {
        let store = VariableStore::open(backend).await?;
        Ok(Session {
            id,
            store,
            connections: RwLock::new(hashbrown::HashMap::new()),
            watch_table: Mutex::new(WatchTable::new()),
            paths: PathCache::new(),
            next_conn_id: AtomicU64::new(1),
            last_active: Mutex::new(Instant::now()),
            shutdown: Notify::new(),
        })
    }

    pub fn store(&self) -> &VariableStore {
        &self.store
    }

    pub fn shutdown_signal(&self) -> &Notify {
        &self.shutdown
    }

    /// Wakes every long-polling connection so shutdown does not wait out
    /// their full `wait` duration (spec.md §5).
    pub fn notify_shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    pub fn touch(&self) {
        *self.last_active.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_active.lock().elapsed()
    }

    pub fn add_connection(&self) -> Arc<Connection> {
        let id = self.next_conn_id.fetch_add(1, Ordering::SeqCst);
        let conn = Arc::new(Connection::new(id));
        trace_write_lock!(self.connections).insert(id, conn.clone());
        conn
    }

    pub fn connection(&self, conn_id: ConnId) -> Option<Arc<Connection>> {
        trace_read_lock!(self.connections).get(&conn_id).cloned()
    }

    pub fn remove_connection(&self, conn_id: ConnId) {
        trace_write_lock!(self.connections).remove(&conn_id);
        self.watch_table.lock().remove_connection(conn_id);
    }

    pub fn connection_count(&self) -> usize {
        trace_read_lock!(self.connections).len()
    }

    /// Adds a watch, capturing the variable's current value — or, if `path`
    /// is given, the value it resolves to (spec.md §4.4, §4.5) — as the
    /// baseline. Requires the variable to exist; an unresolvable path fails
    /// the request outright (the silent-skip rule only applies to later
    /// refreshes, spec.md §4.6).
    pub async fn watch(
        &self,
        conn_id: ConnId,
        id: VarId,
        path: Option<String>,
    ) -> Result<(), VartreeError> {
        let var = self
            .store
            .load(id)
            .await?
            .ok_or(VartreeError::NotFound(id))?;
        let compiled = path.as_deref().map(|p| self.paths.get_or_parse(p)).transpose()?;
        let baseline = match &compiled {
            Some(p) => self.resolve_bound_value(&var, p).await?,
            None => var.value,
        };
        self.watch_table.lock().add(conn_id, id, baseline, compiled);
        Ok(())
    }

    pub fn unwatch(&self, conn_id: ConnId, id: VarId) {
        self.watch_table.lock().remove(conn_id, id);
    }

    /// Resolves `path` against `var`'s value, supplying ancestor values for
    /// any `..` segments (spec.md §4.4) and `@name` lookups via the store's
    /// standard-variable registry. Method segments have no call site in this
    /// implementation and never resolve.
    async fn resolve_bound_value(
        &self,
        var: &Variable,
        path: &Path,
    ) -> Result<serde_json::Value, VartreeError> {
        let parent_hops = path.segments().iter().filter(|s| matches!(s, Segment::Parent)).count();
        let mut ancestors = Vec::with_capacity(parent_hops);
        let mut parent_id = var.parent_id;
        for _ in 0..parent_hops {
            let parent = self
                .store
                .load(parent_id)
                .await?
                .ok_or(VartreeError::NotFound(parent_id))?;
            parent_id = parent.parent_id;
            ancestors.push(parent.value);
        }
        ancestors.reverse();

        let standard_value = match path.segments().first() {
            Some(Segment::Standard(name)) => match self.store.resolve_standard(name) {
                Some(id) => self.store.load(id).await?.map(|v| v.value),
                None => None,
            },
            _ => None,
        };

        let ctx = ResolveContext {
            ancestors: &ancestors,
            standards: &|_| standard_value.clone(),
            methods: &|_, _| None,
        };
        resolve(&var.value, path, &ctx)
    }

    /// One refresh pass (spec.md §4.6): compares every watched baseline
    /// against the current stored (or path-resolved) value and enqueues an
    /// update on each connection whose baseline changed. A variable that no
    /// longer resolves, or whose binding path no longer resolves, is
    /// skipped and its watch retained rather than treated as an error
    /// (spec.md §4.5, §4.6).
    pub async fn refresh_watches(&self) {
        let snapshot = self.watch_table.lock().snapshot();
        for (conn_id, var_id, baseline, path) in snapshot {
            let var = match self.store.load(var_id).await {
                Ok(Some(var)) => var,
                _ => continue,
            };
            let current = match &path {
                Some(p) => match self.resolve_bound_value(&var, p).await {
                    Ok(v) => v,
                    Err(_) => continue,
                },
                None => var.value,
            };
            if current == baseline {
                continue;
            }
            self.watch_table.lock().set_baseline(conn_id, var_id, current.clone());
            if let Some(conn) = self.connection(conn_id) {
                conn.push_update(vartree_types::Update::new(var_id, current));
            }
        }
    }
}
