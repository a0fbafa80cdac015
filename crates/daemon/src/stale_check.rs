//! Global periodic safety net: moves long-silent `working`
//! sessions to `waiting`/`review` without a missing `Stop` hook, and reaps
//! `review` sessions whose worktree directory has been deleted.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sessiond_core::{MachineEvent, MachineState};
use tracing::debug;

use crate::app::AppState;
use crate::transition_session::transition_session;

pub fn spawn(app: Arc<AppState>) {
    let interval = Duration::from_millis(app.config.stale_check_interval_ms);
    let threshold = chrono::Duration::milliseconds(app.config.stale_threshold_ms as i64);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            run_once(&app, threshold).await;
        }
    });
}

async fn run_once(app: &Arc<AppState>, threshold: chrono::Duration) {
    let session_ids = app.registry.all_session_ids().await;
    let now = Utc::now();

    for session_id in session_ids {
        let Some(shared) = app.registry.get(&session_id).await else {
            continue;
        };

        let (state, last_activity_at, worktree_root) = {
            let session = shared.lock().await;
            (
                session.machine_state,
                session.last_activity_at,
                session.worktree_root.clone(),
            )
        };

        match state {
            MachineState::Working => {
                let silent_for = last_activity_at.map(|ts| now.signed_duration_since(ts));
                if silent_for.map(|elapsed| elapsed > threshold).unwrap_or(false) {
                    debug!(session_id, "Stale-check firing STOP");
                    transition_session(app, &session_id, MachineEvent::Stop, "stale-check", None, |_| {})
                        .await;
                }
            }
            MachineState::Review => {
                if let Some(root) = worktree_root {
                    if !Path::new(&root).exists() {
                        debug!(session_id, "Stale-check firing WORKTREE_DELETED");
                        transition_session(
                            app,
                            &session_id,
                            MachineEvent::WorktreeDeleted,
                            "stale-check",
                            None,
                            |_| {},
                        )
                        .await;
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AppState;
    use crate::session::Session;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn stale_working_session_fires_stop() {
        let temp = tempfile::tempdir().unwrap();
        let app = Arc::new(AppState::for_tests(temp.path().to_path_buf()));

        app.registry
            .get_or_insert_with("s1", || {
                let mut session =
                    Session::bootstrap_from_hook("s1".to_string(), None, None, None, Utc::now());
                session.last_activity_at = Some(Utc::now() - ChronoDuration::seconds(120));
                session
            })
            .await;

        run_once(&app, ChronoDuration::seconds(60)).await;

        let shared = app.registry.get("s1").await.unwrap();
        assert_eq!(shared.lock().await.machine_state, MachineState::Waiting);
    }

    #[tokio::test]
    async fn tasking_session_is_never_marked_stale() {
        let temp = tempfile::tempdir().unwrap();
        let app = Arc::new(AppState::for_tests(temp.path().to_path_buf()));

        app.registry
            .get_or_insert_with("s1", || {
                let mut session =
                    Session::bootstrap_from_hook("s1".to_string(), None, None, None, Utc::now());
                session.machine_state = MachineState::Tasking;
                session.last_activity_at = Some(Utc::now() - ChronoDuration::seconds(600));
                session
            })
            .await;

        run_once(&app, ChronoDuration::seconds(60)).await;

        let shared = app.registry.get("s1").await.unwrap();
        assert_eq!(shared.lock().await.machine_state, MachineState::Tasking);
    }

    #[tokio::test]
    async fn review_session_with_deleted_worktree_fires_worktree_deleted() {
        let temp = tempfile::tempdir().unwrap();
        let app = Arc::new(AppState::for_tests(temp.path().to_path_buf()));

        app.registry
            .get_or_insert_with("s1", || {
                let mut session =
                    Session::bootstrap_from_hook("s1".to_string(), None, None, None, Utc::now());
                session.machine_state = MachineState::Review;
                session.is_worktree = true;
                session.worktree_root = Some("/nonexistent/path/for/stale-check-test".to_string());
                session
            })
            .await;

        run_once(&app, ChronoDuration::seconds(60)).await;

        let shared = app.registry.get("s1").await.unwrap();
        assert_eq!(shared.lock().await.machine_state, MachineState::Idle);
    }
}
