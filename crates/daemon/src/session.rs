//! The registry entry: every mutable field the daemon tracks for one
//! session, owned exclusively by the registry and mutated only under the
//! session's own mutex.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sessiond_core::MachineState;

#[derive(Debug, Clone)]
pub struct PendingPermission {
    pub tool_name: String,
    pub tool_input: Option<Value>,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ActiveTool {
    pub tool_name: String,
    pub tool_input: Option<Value>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ActiveTask {
    pub agent_type: String,
    pub description: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TodoProgress {
    pub total: u32,
    pub completed: u32,
}

#[derive(Debug, Clone)]
pub struct Session {
    // Identity
    pub session_id: String,
    pub log_file_path: Option<String>,
    pub cwd: Option<String>,
    pub started_at: DateTime<Utc>,
    pub original_prompt: Option<String>,

    // Machine
    pub machine_state: MachineState,
    pub pending_permission: Option<PendingPermission>,

    // Content metadata
    pub last_activity_at: Option<DateTime<Utc>>,
    pub message_count: u64,
    pub todo_progress: Option<TodoProgress>,
    pub log_tail_offset: u64,

    // Ledgers, keyed by toolUseId
    pub active_tasks: BTreeMap<String, ActiveTask>,
    pub active_tools: BTreeMap<String, ActiveTool>,
    pub compacting_since: Option<DateTime<Utc>>,

    // Git identity
    pub repo_root_path: Option<String>,
    pub repo_url: Option<String>,
    pub repo_id: Option<String>,
    pub git_branch: Option<String>,
    pub is_worktree: bool,
    pub worktree_root: Option<String>,

    // Derived textual fields, filled in asynchronously by the summarizer.
    pub goal: String,
    pub summary: String,
}

impl Session {
    /// A session created by the first hook for it.
    pub fn bootstrap_from_hook(
        session_id: String,
        transcript_path: Option<String>,
        cwd: Option<String>,
        prompt: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            log_file_path: transcript_path,
            cwd,
            started_at: now,
            original_prompt: prompt,
            machine_state: MachineState::Working,
            pending_permission: None,
            last_activity_at: Some(now),
            message_count: 0,
            todo_progress: None,
            log_tail_offset: 0,
            active_tasks: BTreeMap::new(),
            active_tools: BTreeMap::new(),
            compacting_since: None,
            repo_root_path: None,
            repo_url: None,
            repo_id: None,
            git_branch: None,
            is_worktree: false,
            worktree_root: None,
            goal: String::new(),
            summary: String::new(),
        }
    }

    /// A session created by the tailer when a log file exists with no
    /// hook ever having been received for it.
    pub fn bootstrap_from_tailer(session_id: String, log_file_path: String, now: DateTime<Utc>) -> Self {
        Self {
            session_id,
            log_file_path: Some(log_file_path),
            cwd: None,
            started_at: now,
            original_prompt: None,
            machine_state: MachineState::Waiting,
            pending_permission: None,
            last_activity_at: None,
            message_count: 0,
            todo_progress: None,
            log_tail_offset: 0,
            active_tasks: BTreeMap::new(),
            active_tools: BTreeMap::new(),
            compacting_since: None,
            repo_root_path: None,
            repo_url: None,
            repo_id: None,
            git_branch: None,
            is_worktree: false,
            worktree_root: None,
            goal: String::new(),
            summary: String::new(),
        }
    }

    pub fn has_pending_tool_use(&self) -> bool {
        self.machine_state == MachineState::NeedsApproval
    }
}
