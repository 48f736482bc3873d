// vartree
// SPDX-License-Identifier: MPL-2.0

//! Storage back-ends (spec.md §4.7): a `Backend` trait with in-memory,
//! embedded-SQLite, and networked-Postgres implementations, all reachable
//! through the `sqlx::Any` driver so the SQL back-ends share one
//! implementation and differ only in their connection URL.

mod memory;
mod sql;

pub use memory::MemoryBackend;
pub use sql::SqlBackend;

use async_trait::async_trait;
use vartree_types::{VarId, Variable, VartreeError};

/// Persistence schema (spec.md §4.7): one table, stable column names. Two
/// statements, run separately since the `Any` driver does not support
/// multi-statement batches uniformly across back-ends. `session_id` scopes
/// every row to the session that owns it, since a shared Postgres database
/// (unlike SQLite's one-file-per-session layout) has no other isolation
/// boundary between sessions (spec.md §3: "all variables in a session are
/// private to it") and ids are only unique within a session, not globally.
pub const SCHEMA_STATEMENTS: [&str; 2] = [
    r#"CREATE TABLE IF NOT EXISTS variables (
        session_id TEXT NOT NULL,
        id INTEGER NOT NULL,
        parent_id INTEGER NOT NULL,
        value TEXT NOT NULL,
        properties TEXT NOT NULL,
        unbound BOOLEAN NOT NULL,
        PRIMARY KEY (session_id, id)
    )"#,
    r#"CREATE INDEX IF NOT EXISTS variables_session_parent ON variables (session_id, parent_id)"#,
];

/// Abstract persistence back-end. `store` is upsert-by-id; `delete` removes
/// a single row (recursion is the variable store's job, not the back-end's,
/// spec.md §4.7). Implementations must not perform reparenting bookkeeping
/// themselves beyond what the single-row upsert implies.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn store(&self, var: &Variable) -> Result<(), VartreeError>;
    async fn load(&self, id: VarId) -> Result<Option<Variable>, VartreeError>;
    async fn delete(&self, id: VarId) -> Result<(), VartreeError>;
    async fn load_children(&self, parent_id: VarId) -> Result<Vec<VarId>, VartreeError>;
    async fn exists(&self, id: VarId) -> Result<bool, VartreeError>;
    /// Highest id currently stored, or 0 if empty. Lets `VariableStore`
    /// resume monotonic id allocation correctly when reopening a
    /// persistent back-end across restarts.
    async fn max_id(&self) -> Result<VarId, VartreeError>;
    async fn clear(&self) -> Result<(), VartreeError>;
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, VartreeError>;
    async fn close(&self) -> Result<(), VartreeError>;
}

/// Buffers `store`/`delete` operations and applies them on `commit`;
/// `rollback` discards them. Calling any method after commit or rollback is
/// a `TransactionMisuse` error (spec.md §4.3, §7).
#[async_trait]
pub trait Transaction: Send {
    async fn store(&mut self, var: Variable) -> Result<(), VartreeError>;
    async fn delete(&mut self, id: VarId) -> Result<(), VartreeError>;
    async fn commit(&mut self) -> Result<(), VartreeError>;
    async fn rollback(&mut self) -> Result<(), VartreeError>;
}

/// Properties are stored as a JSON object column; this is the wire format
/// between `Variable::properties` and the `properties` TEXT column.
pub(crate) fn encode_properties(props: &vartree_types::Properties) -> String {
    serde_json::to_string(props).unwrap_or_else(|_| "{}".to_owned())
}

pub(crate) fn decode_properties(raw: &str) -> vartree_types::Properties {
    serde_json::from_str(raw).unwrap_or_default()
}
