//! The machine's internal and published vocabularies.
//!
//! `MachineState` is internal to the transition function; `needsApproval` is
//! folded into `PublishedStatus::Waiting` plus a `hasPendingToolUse` flag at
//! the publisher boundary.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MachineState {
    Working,
    Tasking,
    NeedsApproval,
    Waiting,
    Review,
    Idle,
}

impl MachineState {
    /// The externally published status, folding `NeedsApproval` into
    /// `Waiting`.
    pub fn published(self) -> PublishedStatus {
        match self {
            MachineState::Working => PublishedStatus::Working,
            MachineState::Tasking => PublishedStatus::Tasking,
            MachineState::NeedsApproval => PublishedStatus::Waiting,
            MachineState::Waiting => PublishedStatus::Waiting,
            MachineState::Review => PublishedStatus::Review,
            MachineState::Idle => PublishedStatus::Idle,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MachineState::Working => "working",
            MachineState::Tasking => "tasking",
            MachineState::NeedsApproval => "needsApproval",
            MachineState::Waiting => "waiting",
            MachineState::Review => "review",
            MachineState::Idle => "idle",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishedStatus {
    Working,
    Tasking,
    Waiting,
    Review,
    Idle,
}

impl PublishedStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PublishedStatus::Working => "working",
            PublishedStatus::Tasking => "tasking",
            PublishedStatus::Waiting => "waiting",
            PublishedStatus::Review => "review",
            PublishedStatus::Idle => "idle",
        }
    }
}

/// The event vocabulary consumed by the pure transition function. This is
/// distinct from the wire-level `HookEventName`: several hook events map to
/// the same `MachineEvent` (e.g. both `Stop` and the stale-check map to
/// `STOP`), and some hook events (`PreToolUse` for a non-`Task` tool)
/// produce no `MachineEvent` at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineEvent {
    Working,
    Stop,
    Ended,
    PermissionRequest,
    WorktreeDeleted,
    TaskStarted,
    TasksDone,
}

impl MachineEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            MachineEvent::Working => "WORKING",
            MachineEvent::Stop => "STOP",
            MachineEvent::Ended => "ENDED",
            MachineEvent::PermissionRequest => "PERMISSION_REQUEST",
            MachineEvent::WorktreeDeleted => "WORKTREE_DELETED",
            MachineEvent::TaskStarted => "TASK_STARTED",
            MachineEvent::TasksDone => "TASKS_DONE",
        }
    }
}
