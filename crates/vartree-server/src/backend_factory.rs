// vartree
// SPDX-License-Identifier: MPL-2.0

//! Builds the storage back-end for a session (spec.md §4.7, §4.8). Sessions
//! are created lazily on first use of an unknown session id, so opening the
//! back-end is part of that lazy path and must be async (connecting to
//! Postgres, opening a SQLite file).

use std::sync::Arc;

use async_trait::async_trait;
use vartree_core::config::StorageKind;
use vartree_storage::{Backend, MemoryBackend, SqlBackend};
use vartree_types::VartreeError;

#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn open(&self, session_id: &str) -> Result<Arc<dyn Backend>, VartreeError>;
}

/// The back-end factory driven by `Config` (SPEC_FULL.md "Ambient stack").
/// Memory back-ends are one fresh store per session. SQLite additionally
/// gets one file per session, named after the session id, since a single
/// file cannot be opened by two pools safely. Postgres shares one database
/// across all sessions, so `SqlBackend` itself scopes every row by
/// `session_id` (`vartree-storage/src/sql.rs`) — without that, two sessions
/// would both start numbering variables from 1 in the same table and
/// overwrite each other's rows (spec.md §3: sessions are private).
pub struct ConfiguredBackendFactory {
    kind: StorageKind,
    url: String,
}

impl ConfiguredBackendFactory {
    pub fn new(kind: StorageKind, url: String) -> Self {
        ConfiguredBackendFactory { kind, url }
    }
}

#[async_trait]
impl BackendFactory for ConfiguredBackendFactory {
    async fn open(&self, session_id: &str) -> Result<Arc<dyn Backend>, VartreeError> {
        match self.kind {
            StorageKind::Memory => Ok(Arc::new(MemoryBackend::new())),
            StorageKind::Postgres => {
                let backend = SqlBackend::connect(&self.url, session_id).await?;
                Ok(Arc::new(backend))
            }
            StorageKind::Sqlite => {
                let url = if self.url.contains('{') {
                    self.url.replace("{session}", session_id)
                } else {
                    self.url.clone()
                };
                let backend = SqlBackend::connect(&url, session_id).await?;
                Ok(Arc::new(backend))
            }
        }
    }
}
