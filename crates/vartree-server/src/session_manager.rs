// vartree
// SPDX-License-Identifier: MPL-2.0

//! Session registry and lifecycle (spec.md §4.8). Sessions are created
//! lazily on first reference to an unknown session id; a background task
//! evicts sessions idle past `session_timeout`, and `shutdown` drains every
//! session with a grace period before forcing them closed.

use std::sync::Arc;
use std::time::Duration;

use vartree_core::sync::RwLock;
use vartree_core::{trace_read_lock, trace_write_lock};
use vartree_types::VartreeError;

use crate::backend_factory::BackendFactory;
use crate::change_detector::ChangeDetector;
use crate::session::Session;

/// A session plus the change-detection scheduler driving its watch table.
pub struct SessionEntry {
    pub session: Arc<Session>,
    pub detector: Arc<ChangeDetector>,
}

pub struct SessionManager {
    sessions: RwLock<hashbrown::HashMap<String, Arc<SessionEntry>>>,
    factory: Arc<dyn BackendFactory>,
    refresh_interval: Duration,
    session_timeout: Option<Duration>,
}

impl SessionManager {
    pub fn new(
        factory: Arc<dyn BackendFactory>,
        refresh_interval: Duration,
        session_timeout: Option<Duration>,
    ) -> Arc<Self> {
        Arc::new(SessionManager {
            sessions: RwLock::new(hashbrown::HashMap::new()),
            factory,
            refresh_interval,
            session_timeout,
        })
    }

    /// Returns the session for `id`, opening its back-end and creating it if
    /// this is the first time `id` has been seen (spec.md §4.8: "a session
    /// id that has not been seen before is created on demand").
    pub async fn get_or_create(&self, id: &str) -> Result<Arc<SessionEntry>, VartreeError> {
        if let Some(entry) = trace_read_lock!(self.sessions).get(id) {
            return Ok(entry.clone());
        }

        let backend = self.factory.open(id).await?;
        let session = Session::open(id.to_owned(), backend, self.refresh_interval).await?;
        let entry = Arc::new(SessionEntry {
            session: Arc::new(session),
            detector: ChangeDetector::new(self.refresh_interval),
        });

        let mut sessions = trace_write_lock!(self.sessions);
        // Another task may have raced us to create the same session.
        let entry = sessions.entry(id.to_owned()).or_insert(entry).clone();
        Ok(entry)
    }

    pub fn session_count(&self) -> usize {
        trace_read_lock!(self.sessions).len()
    }

    /// Tears a session down immediately: a `Fatal` error on one of its
    /// connections means the session's invariants can no longer be trusted,
    /// not just that one socket (spec.md §7 — `Fatal` maps to session
    /// teardown, unlike `Transport`, which only drops the connection).
    /// Wakes every long-poll on the session so clients observe the session
    /// disappearing rather than hanging until their own timeout.
    pub async fn destroy(&self, id: &str) {
        let entry = trace_write_lock!(self.sessions).remove(id);
        let Some(entry) = entry else {
            return;
        };
        entry.session.notify_shutdown();
        if let Err(e) = entry.session.store().close().await {
            log::warn!("error closing session {id} during fatal teardown: {e}");
        }
    }

    /// Runs until cancelled, evicting sessions idle longer than
    /// `session_timeout`. A `None` timeout disables eviction entirely
    /// (spec.md §4.8: sessions are otherwise permanent).
    pub async fn run_cleanup_loop(self: Arc<Self>, interval: Duration) {
        let Some(timeout) = self.session_timeout else {
            return;
        };
        loop {
            tokio::time::sleep(interval).await;
            self.evict_idle(timeout).await;
        }
    }

    async fn evict_idle(&self, timeout: Duration) {
        let expired: Vec<String> = trace_read_lock!(self.sessions)
            .iter()
            .filter(|(_, entry)| entry.session.connection_count() == 0 && entry.session.idle_for() >= timeout)
            .map(|(id, _)| id.clone())
            .collect();

        for id in expired {
            let entry = trace_write_lock!(self.sessions).remove(&id);
            if let Some(entry) = entry {
                if let Err(e) = entry.session.store().close().await {
                    log::warn!("error closing idle session {id}: {e}");
                }
            }
        }
    }

    /// Signals every long-poll to return, waits `grace` for in-flight
    /// requests to finish, then force-closes every back-end (spec.md §5).
    pub async fn shutdown(&self, grace: Duration) {
        let entries: Vec<Arc<SessionEntry>> =
            trace_read_lock!(self.sessions).values().cloned().collect();
        for entry in &entries {
            entry.session.notify_shutdown();
        }
        tokio::time::sleep(grace).await;
        for entry in &entries {
            if let Err(e) = entry.session.store().close().await {
                log::warn!("error closing session {} during shutdown: {e}", entry.session.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend_factory::ConfiguredBackendFactory;
    use vartree_core::config::StorageKind;

    fn manager() -> Arc<SessionManager> {
        SessionManager::new(
            Arc::new(ConfiguredBackendFactory::new(StorageKind::Memory, String::new())),
            Duration::from_millis(50),
            Some(Duration::from_millis(20)),
        )
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent_per_id() {
        let mgr = manager();
        let a = mgr.get_or_create("s1").await.unwrap();
        let b = mgr.get_or_create("s1").await.unwrap();
        assert!(Arc::ptr_eq(&a.session, &b.session));
        assert_eq!(mgr.session_count(), 1);
    }

    #[tokio::test]
    async fn distinct_ids_get_distinct_sessions() {
        let mgr = manager();
        let a = mgr.get_or_create("s1").await.unwrap();
        let b = mgr.get_or_create("s2").await.unwrap();
        assert!(!Arc::ptr_eq(&a.session, &b.session));
    }

    #[tokio::test]
    async fn evict_idle_removes_sessions_with_no_connections_past_timeout() {
        let mgr = manager();
        mgr.get_or_create("s1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        mgr.evict_idle(Duration::from_millis(20)).await;
        assert_eq!(mgr.session_count(), 0);
    }

    #[tokio::test]
    async fn destroy_removes_the_session_and_wakes_a_pending_long_poll() {
        let mgr = manager();
        let entry = mgr.get_or_create("s1").await.unwrap();
        let conn = entry.session.add_connection();
        let poll = tokio::spawn({
            let conn = conn.clone();
            let shutdown_owner = entry.session.clone();
            async move { conn.poll(Duration::from_secs(5), shutdown_owner.shutdown_signal()).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        mgr.destroy("s1").await;
        assert_eq!(mgr.session_count(), 0);
        let updates = tokio::time::timeout(Duration::from_secs(1), poll)
            .await
            .expect("poll should wake on session destroy")
            .unwrap();
        assert!(updates.is_empty());
    }

    #[tokio::test]
    async fn destroy_of_an_unknown_id_is_a_no_op() {
        let mgr = manager();
        mgr.destroy("never-existed").await;
        assert_eq!(mgr.session_count(), 0);
    }

    #[tokio::test]
    async fn evict_idle_spares_sessions_with_open_connections() {
        let mgr = manager();
        let entry = mgr.get_or_create("s1").await.unwrap();
        let _conn = entry.session.add_connection();
        tokio::time::sleep(Duration::from_millis(30)).await;
        mgr.evict_idle(Duration::from_millis(20)).await;
        assert_eq!(mgr.session_count(), 1);
    }
}
