//! The published Snapshot DTO and the operations the publisher emits.
//!
//! A `Snapshot` is the sole contract with subscribers: flat, immutable, and
//! cheap to clone. Nothing downstream of the publisher ever needs to see a
//! `Session`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoProgress {
    pub total: u32,
    pub completed: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingToolView {
    #[serde(rename = "toolName")]
    pub tool_name: String,
    #[serde(rename = "toolInput", skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<serde_json::Value>,
    #[serde(rename = "requestedAt")]
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveTaskView {
    #[serde(rename = "toolUseId")]
    pub tool_use_id: String,
    #[serde(rename = "agentType")]
    pub agent_type: String,
    pub description: String,
    #[serde(rename = "startedAt")]
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveToolView {
    #[serde(rename = "toolUseId")]
    pub tool_use_id: String,
    #[serde(rename = "toolName")]
    pub tool_name: String,
    #[serde(rename = "startedAt")]
    pub started_at: DateTime<Utc>,
}

/// The flat, immutable DTO published for one session.
///
/// Field names use the same camelCase wire vocabulary as the rest of the
/// protocol, so a dashboard can decode this with no translation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub cwd: String,
    #[serde(rename = "repoRootPath", skip_serializing_if = "Option::is_none")]
    pub repo_root_path: Option<String>,
    #[serde(rename = "repoUrl", skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    #[serde(rename = "repoId", skip_serializing_if = "Option::is_none")]
    pub repo_id: Option<String>,
    #[serde(rename = "gitBranch", skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
    #[serde(rename = "isWorktree")]
    pub is_worktree: bool,
    #[serde(rename = "publishedStatus")]
    pub published_status: String,
    #[serde(rename = "hasPendingToolUse")]
    pub has_pending_tool_use: bool,
    #[serde(rename = "pendingTool", skip_serializing_if = "Option::is_none")]
    pub pending_tool: Option<PendingToolView>,
    #[serde(rename = "lastActivityAt", skip_serializing_if = "Option::is_none")]
    pub last_activity_at: Option<DateTime<Utc>>,
    #[serde(rename = "messageCount")]
    pub message_count: u64,
    #[serde(rename = "activeTasks")]
    pub active_tasks: Vec<ActiveTaskView>,
    #[serde(rename = "activeTools")]
    pub active_tools: Vec<ActiveToolView>,
    #[serde(rename = "todoProgress", skip_serializing_if = "Option::is_none")]
    pub todo_progress: Option<TodoProgress>,
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub summary: String,
}

/// A publication against the subscriber-visible collection keyed by
/// `sessionId`. On `Delete` the snapshot is the last known value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PublishedOp {
    Insert { snapshot: Snapshot },
    Update { snapshot: Snapshot },
    Delete { snapshot: Snapshot },
}

impl PublishedOp {
    pub fn session_id(&self) -> &str {
        match self {
            PublishedOp::Insert { snapshot }
            | PublishedOp::Update { snapshot }
            | PublishedOp::Delete { snapshot } => &snapshot.session_id,
        }
    }
}
