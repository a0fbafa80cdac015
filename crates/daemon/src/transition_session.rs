//! `transitionSession`: the single call-site for the pure transition
//! function, plus its side effects. Every machine mutation in the
//! daemon goes through this function.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use sessiond_core::{transition, MachineEvent, MachineState};
use tracing::debug;

use crate::app::AppState;
use crate::audit;
use crate::session::Session;

/// Applies `event` to the session named `session_id`. `pre` runs first,
/// under the session's lock, to stage any mutation the event needs before
/// the transition is computed (e.g. recording a resolved `pendingPermission`).
///
/// Returns `true` if the state actually changed.
///
/// Boxed because step 7 ("auto-escalation") recursively calls this
/// function; a plain `async fn` can't describe its own return type.
pub fn transition_session<'a, F>(
    app: &'a Arc<AppState>,
    session_id: &'a str,
    event: MachineEvent,
    source: &'a str,
    tool: Option<&'a str>,
    pre: F,
) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>
where
    F: FnOnce(&mut Session) + Send + 'a,
{
    Box::pin(async move {
        let Some(shared) = app.registry.get(session_id).await else {
            return false;
        };

        let (prev, next, state_changed, should_auto_escalate) = {
            let mut session = shared.lock().await;
            pre(&mut session);

            let prev = session.machine_state;
            let next = transition(prev, event, session.is_worktree);
            let state_changed = next != prev;

            let should_auto_escalate = if state_changed {
                // On-exit side effects.
                let leaving_active_set = !matches!(
                    next,
                    MachineState::Working | MachineState::Tasking | MachineState::NeedsApproval
                );
                if leaving_active_set {
                    app.timers.cancel_permission_debounce(session_id);
                }
                if prev == MachineState::NeedsApproval {
                    session.pending_permission = None;
                }

                session.machine_state = next;
                audit::append_transition(
                    &app.state_dir,
                    session_id,
                    prev.as_str(),
                    next.as_str(),
                    event.as_str(),
                    source,
                    tool,
                );

                next == MachineState::Working && !session.active_tasks.is_empty()
            } else {
                false
            };

            // `pre` may have mutated fields the snapshot carries (e.g. a
            // resolved `pending_permission`) even when the machine state
            // itself is a no-op; publish unconditionally and let the
            // publisher's own diff decide whether anything is worth sending.
            app.publisher.publish(&session);

            (prev, next, state_changed, should_auto_escalate)
        };

        if !state_changed {
            return false;
        }

        debug!(session_id, ?prev, ?next, event = event.as_str(), source, "transition committed");

        // Auto-escalation: re-entrant, depth <= 1
        // because a session freshly escalated to `tasking` cannot itself
        // have a non-empty active-tasks ledger land on `working` again
        // without an intervening TASKS_DONE.
        if should_auto_escalate {
            transition_session(
                app,
                session_id,
                MachineEvent::TaskStarted,
                "auto-escalation",
                None,
                |_| {},
            )
            .await;
        }

        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AppState;
    use crate::session::{ActiveTask, Session};
    use chrono::Utc;

    async fn test_app() -> Arc<AppState> {
        let temp = tempfile::tempdir().unwrap();
        Arc::new(AppState::for_tests(temp.path().to_path_buf()))
    }

    #[tokio::test]
    async fn no_op_transition_returns_false() {
        let app = test_app().await;
        let (shared, _) = app
            .registry
            .get_or_insert_with("s1", || {
                Session::bootstrap_from_hook("s1".to_string(), None, None, None, Utc::now())
            })
            .await;
        app.publisher.publish(&*shared.lock().await);

        // idle + STOP is a no-op per the table.
        let mut rx = app.publisher.subscribe();
        let changed = transition_session(&app, "s1", MachineEvent::Stop, "test", None, |s| {
            s.machine_state = MachineState::Idle;
        })
        .await;
        assert!(!changed);
        // Nothing in the published snapshot actually differs, so no event
        // should have been emitted even though `publish` was called again.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn no_op_transition_still_publishes_pre_mutation() {
        let app = test_app().await;
        let (shared, _) = app
            .registry
            .get_or_insert_with("s1", || {
                let mut session =
                    Session::bootstrap_from_hook("s1".to_string(), None, None, None, Utc::now());
                session.machine_state = MachineState::NeedsApproval;
                session
            })
            .await;
        app.publisher.publish(&*shared.lock().await);

        // NEEDS_APPROVAL + PERMISSION_REQUEST is a no-op per the table, but a
        // second tool's debounce resolving during it still updates
        // `pending_permission` and must reach subscribers.
        let mut rx = app.publisher.subscribe();
        let changed = transition_session(
            &app,
            "s1",
            MachineEvent::PermissionRequest,
            "test",
            Some("Bash"),
            |s| {
                s.pending_permission = Some(crate::session::PendingPermission {
                    tool_name: "Bash".to_string(),
                    tool_input: None,
                    requested_at: Utc::now(),
                });
            },
        )
        .await;
        assert!(!changed);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn auto_escalation_lands_on_tasking() {
        let app = test_app().await;
        app.registry
            .get_or_insert_with("s1", || {
                let mut session =
                    Session::bootstrap_from_hook("s1".to_string(), None, None, None, Utc::now());
                session.machine_state = MachineState::NeedsApproval;
                session.active_tasks.insert(
                    "t1".to_string(),
                    ActiveTask {
                        agent_type: "Bash".to_string(),
                        description: "Run tests".to_string(),
                        started_at: Utc::now(),
                    },
                );
                session
            })
            .await;

        let changed =
            transition_session(&app, "s1", MachineEvent::Working, "test", None, |_| {}).await;
        assert!(changed);

        let shared = app.registry.get("s1").await.unwrap();
        let session = shared.lock().await;
        assert_eq!(session.machine_state, MachineState::Tasking);
    }
}
