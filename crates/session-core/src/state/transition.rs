//! The pure transition function: `(state, event, isWorktree) -> state'`.
//!
//! Total, deterministic, referentially transparent. This is the ONLY place
//! that decides the next `MachineState`; every other component only calls
//! it and reacts to the result.

use super::types::{MachineEvent, MachineState};

/// `review` if the session lives in a worktree, else `idle`.
fn paused_terminal(is_worktree: bool) -> MachineState {
    if is_worktree {
        MachineState::Review
    } else {
        MachineState::Idle
    }
}

/// `review` if the session lives in a worktree, else `waiting`.
fn paused(is_worktree: bool) -> MachineState {
    if is_worktree {
        MachineState::Review
    } else {
        MachineState::Waiting
    }
}

/// Reduces `(state, event, isWorktree)` to the next state. Unlisted
/// (state, event) pairs are no-ops (`state` is returned unchanged).
pub fn transition(state: MachineState, event: MachineEvent, is_worktree: bool) -> MachineState {
    use MachineEvent::*;
    use MachineState::*;

    match (state, event) {
        (Working, Working) => Working,
        (Working, Stop) => paused(is_worktree),
        (Working, Ended) => paused_terminal(is_worktree),
        (Working, PermissionRequest) => NeedsApproval,
        (Working, TaskStarted) => Tasking,

        (Tasking, Tasking) | (Tasking, Working) => Tasking,
        (Tasking, Stop) => paused(is_worktree),
        (Tasking, Ended) => paused_terminal(is_worktree),
        (Tasking, PermissionRequest) => NeedsApproval,
        (Tasking, TasksDone) => Working,

        (NeedsApproval, Working) => Working,
        (NeedsApproval, Stop) => paused(is_worktree),
        (NeedsApproval, Ended) => paused_terminal(is_worktree),
        (NeedsApproval, NeedsApproval) | (NeedsApproval, PermissionRequest) => NeedsApproval,

        (Waiting, Working) => Working,
        (Waiting, Ended) => paused_terminal(is_worktree),
        (Waiting, PermissionRequest) => NeedsApproval,

        (Review, Working) => Working,
        (Review, WorktreeDeleted) => Idle,

        (Idle, Working) => Working,

        (same, _) => same,
    }
}
