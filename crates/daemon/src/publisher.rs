//! Serializes `Session` records into `Snapshot`s, compares against the last
//! published snapshot per session, and emits `insert`/`update`/`delete` to
//! subscribers.

use std::collections::HashMap;
use std::sync::Mutex;

use sessiond_protocol::{
    ActiveTaskView, ActiveToolView, PendingToolView, PublishedOp, Snapshot, TodoProgress,
};
use tokio::sync::broadcast;

use crate::session::Session;

const CHANNEL_CAPACITY: usize = 1024;

pub struct Publisher {
    last: Mutex<HashMap<String, Snapshot>>,
    tx: broadcast::Sender<PublishedOp>,
}

impl Default for Publisher {
    fn default() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            last: Mutex::new(HashMap::new()),
            tx,
        }
    }
}

impl Publisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedOp> {
        self.tx.subscribe()
    }

    /// Existing sessions, for a subscriber's initial bulk and for
    /// `GET /snapshots`.
    pub fn bulk(&self) -> Vec<Snapshot> {
        self.last.lock().unwrap().values().cloned().collect()
    }

    /// Builds a `Snapshot` from `session` and emits `insert`/`update` if the
    /// change-detection fields differ from the last published snapshot.
    /// Always emits on first observation.
    pub fn publish(&self, session: &Session) {
        let snapshot = build_snapshot(session);
        let mut last = self.last.lock().unwrap();

        let op = match last.get(&snapshot.session_id) {
            None => Some(PublishedOp::Insert {
                snapshot: snapshot.clone(),
            }),
            Some(previous) if changed(previous, &snapshot) => Some(PublishedOp::Update {
                snapshot: snapshot.clone(),
            }),
            Some(_) => None,
        };

        last.insert(snapshot.session_id.clone(), snapshot);
        drop(last);

        if let Some(op) = op {
            // Subscriber delivery happens outside any session mutex; a
            // send error just means there are currently no subscribers.
            let _ = self.tx.send(op);
        }
    }

    /// Emits exactly one `delete` with the last known snapshot, if any.
    pub fn remove(&self, session_id: &str) {
        let removed = self.last.lock().unwrap().remove(session_id);
        if let Some(snapshot) = removed {
            let _ = self.tx.send(PublishedOp::Delete { snapshot });
        }
    }
}

/// A session is republished when any field changes, except `message_count`
/// which only counts as a change when it increases — a re-read of an
/// already-tailed line range must never walk a client's view backwards.
fn changed(previous: &Snapshot, next: &Snapshot) -> bool {
    if next.message_count > previous.message_count {
        return true;
    }
    let mut adjusted = next.clone();
    adjusted.message_count = previous.message_count;
    adjusted != *previous
}

fn build_snapshot(session: &Session) -> Snapshot {
    let mut active_tasks: Vec<ActiveTaskView> = session
        .active_tasks
        .iter()
        .map(|(tool_use_id, task)| ActiveTaskView {
            tool_use_id: tool_use_id.clone(),
            agent_type: task.agent_type.clone(),
            description: task.description.clone(),
            started_at: task.started_at,
        })
        .collect();

    if let Some(compacting_since) = session.compacting_since {
        active_tasks.push(ActiveTaskView {
            tool_use_id: "compacting".to_string(),
            agent_type: "System".to_string(),
            description: "Compacting context".to_string(),
            started_at: compacting_since,
        });
    }

    let active_tools: Vec<ActiveToolView> = session
        .active_tools
        .iter()
        .filter(|(_, tool)| tool.tool_name != "Task")
        .map(|(tool_use_id, tool)| ActiveToolView {
            tool_use_id: tool_use_id.clone(),
            tool_name: tool.tool_name.clone(),
            started_at: tool.started_at,
        })
        .collect();

    let pending_tool = session.pending_permission.as_ref().map(|pending| PendingToolView {
        tool_name: pending.tool_name.clone(),
        tool_input: pending.tool_input.clone(),
        requested_at: pending.requested_at,
    });

    Snapshot {
        session_id: session.session_id.clone(),
        cwd: session.cwd.clone().unwrap_or_default(),
        repo_root_path: session.repo_root_path.clone(),
        repo_url: session.repo_url.clone(),
        repo_id: session.repo_id.clone(),
        git_branch: session.git_branch.clone(),
        is_worktree: session.is_worktree,
        published_status: session.machine_state.published().as_str().to_string(),
        has_pending_tool_use: session.has_pending_tool_use(),
        pending_tool,
        last_activity_at: session.last_activity_at,
        message_count: session.message_count,
        active_tasks,
        active_tools,
        todo_progress: session.todo_progress.as_ref().map(|t| TodoProgress {
            total: t.total,
            completed: t.completed,
        }),
        goal: session.goal.clone(),
        summary: session.summary.clone(),
    }
}
