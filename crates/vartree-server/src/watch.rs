// vartree
// SPDX-License-Identifier: MPL-2.0

//! Per-session watch table (spec.md §4.5): which connections watch which
//! variables, and the per-(connection, variable) baseline value compared on
//! each refresh pass. Watches are idempotent — adding an already-held watch
//! or removing an absent one is a no-op, not an error. A watch may also
//! carry a binding path (spec.md §4.4, §4.6): the baseline and every refresh
//! then compare at that path's resolved value instead of the bare variable.

use std::sync::Arc;

use hashbrown::{HashMap, HashSet};

use vartree_store::path::Path;
use vartree_types::{VarId, Value};

use crate::connection::ConnId;

#[derive(Default)]
pub struct WatchTable {
    watchers: HashMap<VarId, HashSet<ConnId>>,
    baselines: HashMap<(ConnId, VarId), (Value, Option<Arc<Path>>)>,
}

impl WatchTable {
    pub fn new() -> Self {
        WatchTable::default()
    }

    /// Registers `conn` as watching `id`, capturing `current` as its
    /// baseline. Idempotent: re-watching does not reset the baseline, since
    /// the connection has already seen that value.
    pub fn add(&mut self, conn: ConnId, id: VarId, current: Value, path: Option<Arc<Path>>) {
        let key = (conn, id);
        if self.baselines.contains_key(&key) {
            return;
        }
        self.watchers.entry(id).or_default().insert(conn);
        self.baselines.insert(key, (current, path));
    }

    pub fn remove(&mut self, conn: ConnId, id: VarId) {
        self.baselines.remove(&(conn, id));
        if let Some(conns) = self.watchers.get_mut(&id) {
            conns.remove(&conn);
            if conns.is_empty() {
                self.watchers.remove(&id);
            }
        }
    }

    /// Drops every watch held by `conn`, e.g. on disconnect.
    pub fn remove_connection(&mut self, conn: ConnId) {
        self.baselines.retain(|(c, _), _| *c != conn);
        self.watchers.retain(|_, conns| {
            conns.remove(&conn);
            !conns.is_empty()
        });
    }

    pub fn is_watching(&self, conn: ConnId, id: VarId) -> bool {
        self.baselines.contains_key(&(conn, id))
    }

    /// A snapshot of every `(connection, variable, baseline, path)` tuple,
    /// for a refresh pass to compare against fresh values without holding
    /// the table lock while it does so.
    pub fn snapshot(&self) -> Vec<(ConnId, VarId, Value, Option<Arc<Path>>)> {
        self.baselines
            .iter()
            .map(|((conn, id), (baseline, path))| (*conn, *id, baseline.clone(), path.clone()))
            .collect()
    }

    pub fn set_baseline(&mut self, conn: ConnId, id: VarId, value: Value) {
        if let Some(slot) = self.baselines.get_mut(&(conn, id)) {
            slot.0 = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent_and_keeps_first_baseline() {
        let mut t = WatchTable::new();
        t.add(1, 10, serde_json::json!("first"), None);
        t.add(1, 10, serde_json::json!("second"), None);
        let snap = t.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].2, serde_json::json!("first"));
    }

    #[test]
    fn remove_is_a_no_op_when_absent() {
        let mut t = WatchTable::new();
        t.remove(1, 10);
        assert!(t.snapshot().is_empty());
    }

    #[test]
    fn remove_connection_drops_all_its_watches_but_not_others() {
        let mut t = WatchTable::new();
        t.add(1, 10, serde_json::json!(1), None);
        t.add(2, 10, serde_json::json!(1), None);
        t.remove_connection(1);
        assert!(!t.is_watching(1, 10));
        assert!(t.is_watching(2, 10));
    }

    #[test]
    fn add_carries_an_optional_binding_path() {
        let mut t = WatchTable::new();
        let path = Arc::new(Path::parse("name").unwrap());
        t.add(1, 10, serde_json::json!("a"), Some(path.clone()));
        let snap = t.snapshot();
        assert_eq!(snap.len(), 1);
        assert!(snap[0].3.is_some());
    }
}
