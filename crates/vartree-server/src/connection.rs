// vartree
// SPDX-License-Identifier: MPL-2.0

//! A client socket bound to a session (spec.md §3, §4.5). Owns an outbound
//! queue of pending updates and is woken by `Session::refresh_watches` via
//! `tokio::sync::Notify`, the way long-poll waiters are woken without
//! holding any store lock across the wait (spec.md §5).

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Notify;
use vartree_core::sync::Mutex;
use vartree_types::Update;

pub type ConnId = u64;

pub struct Connection {
    pub id: ConnId,
    queue: Mutex<VecDeque<Update>>,
    notify: Notify,
}

impl Connection {
    pub fn new(id: ConnId) -> Self {
        Connection {
            id,
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Enqueues an update and wakes any blocked `poll`.
    pub fn push_update(&self, update: Update) {
        self.queue.lock().push_back(update);
        self.notify.notify_waiters();
    }

    /// Drains and returns all pending updates, clearing the queue.
    pub fn drain(&self) -> Vec<Update> {
        self.queue.lock().drain(..).collect()
    }

    /// Implements `poll` (spec.md §4.2, §4.5): returns immediately if
    /// updates are already pending; otherwise blocks up to `wait`, woken
    /// early either by a new update or by `shutdown` (session teardown,
    /// spec.md §5 "Shutdown signals all long-polls to return immediately").
    pub async fn poll(&self, wait: Duration, shutdown: &Notify) -> Vec<Update> {
        let pending = self.drain();
        if !pending.is_empty() || wait.is_zero() {
            return pending;
        }

        let woken = self.notify.notified();
        let shutting_down = shutdown.notified();
        tokio::select! {
            _ = woken => {}
            _ = shutting_down => {}
            _ = tokio::time::sleep(wait) => {}
        }
        self.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vartree_types::Update as U;

    #[tokio::test]
    async fn poll_returns_immediately_when_updates_are_pending() {
        let conn = Connection::new(1);
        conn.push_update(U::new(2, serde_json::json!("B")));
        let shutdown = Notify::new();
        let pending = conn.poll(Duration::from_secs(30), &shutdown).await;
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn poll_times_out_when_nothing_arrives() {
        let conn = Connection::new(1);
        let shutdown = Notify::new();
        let start = tokio::time::Instant::now();
        let pending = conn.poll(Duration::from_millis(20), &shutdown).await;
        assert!(pending.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn poll_wakes_early_on_update() {
        let conn = std::sync::Arc::new(Connection::new(1));
        let shutdown = std::sync::Arc::new(Notify::new());
        let conn2 = conn.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            conn2.push_update(U::new(3, serde_json::json!(1)));
        });
        let pending = conn.poll(Duration::from_secs(30), &shutdown).await;
        handle.await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn poll_wakes_on_shutdown() {
        let conn = Connection::new(1);
        let shutdown = std::sync::Arc::new(Notify::new());
        let shutdown2 = shutdown.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            shutdown2.notify_waiters();
        });
        let pending = conn.poll(Duration::from_secs(30), &shutdown).await;
        handle.await.unwrap();
        assert!(pending.is_empty());
    }
}
