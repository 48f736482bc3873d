// vartree
// SPDX-License-Identifier: MPL-2.0

//! Throttled change-detection scheduler (spec.md §4.6). A write triggers
//! `schedule_refresh`, which runs the refresh immediately if the previous
//! one finished more than `interval` ago, or otherwise defers it to the
//! remainder of the interval; concurrent callers during the deferred window
//! coalesce into the single pending run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use vartree_core::sync::Mutex;

use crate::session::Session;

struct ThrottleState {
    last_run: Option<Instant>,
    scheduled: bool,
}

pub struct ChangeDetector {
    interval: Duration,
    state: Mutex<ThrottleState>,
}

impl ChangeDetector {
    pub fn new(interval: Duration) -> Arc<Self> {
        Arc::new(ChangeDetector {
            interval,
            state: Mutex::new(ThrottleState {
                last_run: None,
                scheduled: false,
            }),
        })
    }

    /// Requests a refresh pass over `session`'s watch table. Returns
    /// immediately; the refresh itself runs on a spawned task, either now or
    /// after the remainder of the throttle window.
    pub fn schedule_refresh(self: &Arc<Self>, session: Arc<Session>) {
        let now = Instant::now();
        let mut state = self.state.lock();
        if state.scheduled {
            return;
        }
        let run_immediately = match state.last_run {
            None => true,
            Some(last) => now.duration_since(last) >= self.interval,
        };

        if run_immediately {
            state.last_run = Some(now);
            drop(state);
            let detector = self.clone();
            tokio::spawn(async move {
                session.refresh_watches().await;
                let _ = &detector;
            });
            return;
        }

        let remainder = self.interval - now.duration_since(state.last_run.unwrap());
        state.scheduled = true;
        drop(state);
        let detector = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(remainder).await;
            {
                let mut state = detector.state.lock();
                state.scheduled = false;
                state.last_run = Some(Instant::now());
            }
            session.refresh_watches().await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use std::sync::Arc;
    use vartree_storage::MemoryBackend;

    async fn session() -> Arc<Session> {
        Arc::new(
            Session::open("s".to_owned(), Arc::new(MemoryBackend::new()), Duration::from_millis(30))
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn first_refresh_runs_immediately() {
        let s = session().await;
        let detector = ChangeDetector::new(Duration::from_millis(30));
        let conn = s.add_connection();
        let id = s.store().create(1, serde_json::json!(1), Default::default(), true).await.unwrap();
        s.watch(conn.id, id, None).await.unwrap();
        s.store().update(id, Some(serde_json::json!(2)), None, None).await.unwrap();

        detector.schedule_refresh(s.clone());
        tokio::time::sleep(Duration::from_millis(10)).await;
        let pending = conn.drain();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].value, serde_json::json!(2));
    }

    #[tokio::test]
    async fn a_second_call_during_the_throttle_window_coalesces() {
        let s = session().await;
        let detector = ChangeDetector::new(Duration::from_millis(50));
        detector.schedule_refresh(s.clone());
        tokio::time::sleep(Duration::from_millis(5)).await;
        // Second call lands inside the throttle window; it must not spawn a
        // second run on top of the deferred one.
        detector.schedule_refresh(s.clone());
        assert!(detector.state.lock().scheduled);
    }
}
