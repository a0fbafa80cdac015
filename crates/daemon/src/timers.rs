//! Coalescing timers: per-session permission debounce (at-most-one) and
//! per-file log-write coalescing (latest-wins). Both are cancellable from
//! unrelated code paths and carry only a session-id / path, never a
//! reference into the registry.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;

/// A pending permission debounce, tagged with the `toolUseId` it will
/// resolve to once it fires (if known at schedule time). `PostToolUse`
/// and `PostToolUseFailure` must only cancel a debounce that is either
/// unresolved or resolves to the same tool use that just completed —
/// otherwise a slow tool's completion could cancel a different, younger
/// tool's pending permission prompt.
struct PendingPermission {
    handle: JoinHandle<()>,
    resolved_tool_use_id: Option<String>,
}

#[derive(Default)]
pub struct TimerManager {
    permission: Mutex<HashMap<String, PendingPermission>>,
    file_coalesce: Mutex<HashMap<PathBuf, JoinHandle<()>>>,
}

impl TimerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels any outstanding permission debounce for `session_id` and
    /// schedules a new one. `on_fire` runs after `delay` unless cancelled
    /// first. `resolved_tool_use_id` records which tool use this debounce
    /// will be attributed to, if known.
    pub fn schedule_permission_debounce<F>(
        &self,
        session_id: &str,
        delay: Duration,
        resolved_tool_use_id: Option<String>,
        on_fire: F,
    ) where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.cancel_permission_debounce(session_id);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire.await;
        });
        self.permission.lock().unwrap().insert(
            session_id.to_string(),
            PendingPermission {
                handle,
                resolved_tool_use_id,
            },
        );
    }

    /// Cancels a session's pending permission debounce, if any. Returns
    /// true if a timer was actually cancelled.
    pub fn cancel_permission_debounce(&self, session_id: &str) -> bool {
        if let Some(pending) = self.permission.lock().unwrap().remove(session_id) {
            pending.handle.abort();
            true
        } else {
            false
        }
    }

    /// Cancels `session_id`'s pending permission debounce only if it is
    /// unresolved or resolves to `tool_use_id`. Used by `PostToolUse`/
    /// `PostToolUseFailure` so a completing tool can't cancel a debounce
    /// that belongs to a different, still-pending tool.
    pub fn cancel_permission_debounce_if_matching(&self, session_id: &str, tool_use_id: &str) -> bool {
        let mut guard = self.permission.lock().unwrap();
        let Some(pending) = guard.get(session_id) else {
            return false;
        };
        let matches = match &pending.resolved_tool_use_id {
            None => true,
            Some(id) => id == tool_use_id,
        };
        if !matches {
            return false;
        }
        let pending = guard.remove(session_id).unwrap();
        pending.handle.abort();
        true
    }

    pub fn has_pending_permission_debounce(&self, session_id: &str) -> bool {
        self.permission.lock().unwrap().contains_key(session_id)
    }

    /// Cancels any outstanding coalesce timer for `path` and schedules a
    /// new one (latest-wins).
    pub fn schedule_file_coalesce<F>(&self, path: PathBuf, delay: Duration, on_fire: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.cancel_file_coalesce(&path);
        let key = path.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire.await;
        });
        self.file_coalesce.lock().unwrap().insert(key, handle);
    }

    pub fn cancel_file_coalesce(&self, path: &PathBuf) -> bool {
        if let Some(handle) = self.file_coalesce.lock().unwrap().remove(path) {
            handle.abort();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn debounce_fires_once_after_delay() {
        let timers = TimerManager::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        timers.schedule_permission_debounce("s1", Duration::from_millis(20), None, async move {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rescheduling_cancels_the_previous_timer() {
        let timers = TimerManager::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let c1 = counter.clone();
        timers.schedule_permission_debounce("s1", Duration::from_millis(20), None, async move {
            c1.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(5)).await;

        let c2 = counter.clone();
        timers.schedule_permission_debounce("s1", Duration::from_millis(20), None, async move {
            c2.fetch_add(10, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn cancel_prevents_firing() {
        let timers = TimerManager::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        timers.schedule_permission_debounce("s1", Duration::from_millis(10), None, async move {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timers.cancel_permission_debounce("s1"));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn selective_cancel_ignores_mismatched_tool_use_id() {
        let timers = TimerManager::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        timers.schedule_permission_debounce(
            "s1",
            Duration::from_millis(10),
            Some("tool-a".to_string()),
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            },
        );

        assert!(!timers.cancel_permission_debounce_if_matching("s1", "tool-b"));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn selective_cancel_matches_resolved_tool_use_id() {
        let timers = TimerManager::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        timers.schedule_permission_debounce(
            "s1",
            Duration::from_millis(10),
            Some("tool-a".to_string()),
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            },
        );

        assert!(timers.cancel_permission_debounce_if_matching("s1", "tool-a"));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn selective_cancel_always_cancels_unresolved_debounce() {
        let timers = TimerManager::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        timers.schedule_permission_debounce("s1", Duration::from_millis(10), None, async move {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(timers.cancel_permission_debounce_if_matching("s1", "anything"));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
