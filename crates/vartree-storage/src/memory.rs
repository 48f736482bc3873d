// vartree
// SPDX-License-Identifier: MPL-2.0

//! Authoritative per-process in-memory back-end. Additionally maintains the
//! child index (spec.md §4.7) since there is no indexed column to
//! reconstruct it from.

use std::sync::Arc;

use async_trait::async_trait;
use hashbrown::HashMap;
use vartree_core::sync::RwLock;
use vartree_core::{trace_read_lock, trace_write_lock};
use vartree_types::{VarId, Variable, VartreeError};

use crate::{Backend, Transaction};

#[derive(Default)]
struct State {
    records: HashMap<VarId, Variable>,
    children: HashMap<VarId, Vec<VarId>>,
}

impl State {
    fn insert(&mut self, var: Variable) {
        if let Some(old) = self.records.get(&var.id) {
            if old.parent_id != var.parent_id {
                if let Some(siblings) = self.children.get_mut(&old.parent_id) {
                    siblings.retain(|&id| id != var.id);
                }
            }
        }
        let siblings = self.children.entry(var.parent_id).or_default();
        if !siblings.contains(&var.id) {
            siblings.push(var.id);
        }
        self.records.insert(var.id, var);
    }

    fn remove(&mut self, id: VarId) {
        if let Some(old) = self.records.remove(&id) {
            if let Some(siblings) = self.children.get_mut(&old.parent_id) {
                siblings.retain(|&sid| sid != id);
            }
        }
        self.children.remove(&id);
    }
}

/// In-memory `Backend`. Transactions buffer operations under a plain `Vec`
/// and apply them to `State` in order while holding the write lock, the way
/// `spec.md` §4.7 describes for this back-end.
pub struct MemoryBackend {
    state: Arc<RwLock<State>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        MemoryBackend::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend {
            state: Arc::new(RwLock::new(State::default())),
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn store(&self, var: &Variable) -> Result<(), VartreeError> {
        trace_write_lock!(self.state).insert(var.clone());
        Ok(())
    }

    async fn load(&self, id: VarId) -> Result<Option<Variable>, VartreeError> {
        Ok(trace_read_lock!(self.state).records.get(&id).cloned())
    }

    async fn delete(&self, id: VarId) -> Result<(), VartreeError> {
        trace_write_lock!(self.state).remove(id);
        Ok(())
    }

    async fn load_children(&self, parent_id: VarId) -> Result<Vec<VarId>, VartreeError> {
        Ok(trace_read_lock!(self.state)
            .children
            .get(&parent_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn exists(&self, id: VarId) -> Result<bool, VartreeError> {
        Ok(trace_read_lock!(self.state).records.contains_key(&id))
    }

    async fn max_id(&self) -> Result<VarId, VartreeError> {
        Ok(trace_read_lock!(self.state)
            .records
            .keys()
            .copied()
            .max()
            .unwrap_or(0))
    }

    async fn clear(&self) -> Result<(), VartreeError> {
        *trace_write_lock!(self.state) = State::default();
        Ok(())
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, VartreeError> {
        Ok(Box::new(MemoryTransaction {
            state: self.state.clone(),
            ops: Vec::new(),
            finished: false,
        }))
    }

    async fn close(&self) -> Result<(), VartreeError> {
        Ok(())
    }
}

enum Op {
    Store(Variable),
    Delete(VarId),
}

struct MemoryTransaction {
    state: Arc<RwLock<State>>,
    ops: Vec<Op>,
    finished: bool,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn store(&mut self, var: Variable) -> Result<(), VartreeError> {
        if self.finished {
            return Err(VartreeError::TransactionMisuse(
                "store after commit/rollback".to_owned(),
            ));
        }
        self.ops.push(Op::Store(var));
        Ok(())
    }

    async fn delete(&mut self, id: VarId) -> Result<(), VartreeError> {
        if self.finished {
            return Err(VartreeError::TransactionMisuse(
                "delete after commit/rollback".to_owned(),
            ));
        }
        self.ops.push(Op::Delete(id));
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), VartreeError> {
        if self.finished {
            return Err(VartreeError::TransactionMisuse(
                "double commit".to_owned(),
            ));
        }
        self.finished = true;
        let mut state = trace_write_lock!(self.state);
        for op in self.ops.drain(..) {
            match op {
                Op::Store(var) => state.insert(var),
                Op::Delete(id) => state.remove(id),
            }
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), VartreeError> {
        if self.finished {
            return Err(VartreeError::TransactionMisuse(
                "rollback after commit/rollback".to_owned(),
            ));
        }
        self.finished = true;
        self.ops.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(id: VarId, parent: VarId) -> Variable {
        Variable {
            id,
            parent_id: parent,
            value: serde_json::Value::Null,
            properties: Default::default(),
            unbound: false,
        }
    }

    #[tokio::test]
    async fn store_and_load_round_trips() {
        let backend = MemoryBackend::new();
        backend.store(&var(1, 0)).await.unwrap();
        let loaded = backend.load(1).await.unwrap().unwrap();
        assert_eq!(loaded.id, 1);
        assert_eq!(loaded.parent_id, 0);
    }

    #[tokio::test]
    async fn delete_removes_from_parent_child_list() {
        let backend = MemoryBackend::new();
        backend.store(&var(1, 0)).await.unwrap();
        backend.store(&var(2, 1)).await.unwrap();
        assert_eq!(backend.load_children(1).await.unwrap(), vec![2]);
        backend.delete(2).await.unwrap();
        assert!(backend.load_children(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rollback_discards_buffered_ops() {
        let backend = MemoryBackend::new();
        backend.store(&var(1, 0)).await.unwrap();
        let mut tx = backend.begin_transaction().await.unwrap();
        tx.store(var(2, 1)).await.unwrap();
        tx.delete(1).await.unwrap();
        tx.rollback().await.unwrap();
        assert!(backend.exists(1).await.unwrap());
        assert!(!backend.exists(2).await.unwrap());
    }

    #[tokio::test]
    async fn double_commit_is_a_transaction_error() {
        let backend = MemoryBackend::new();
        let mut tx = backend.begin_transaction().await.unwrap();
        tx.store(var(1, 0)).await.unwrap();
        tx.commit().await.unwrap();
        let err = tx.commit().await.unwrap_err();
        assert_eq!(err.kind(), vartree_types::ErrorKind::TransactionMisuse);
    }
}
