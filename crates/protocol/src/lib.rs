//! Wire schema for the session status daemon.
//!
//! This crate is shared by the daemon and anything that talks to it (the hook
//! forwarder, a future dashboard) to prevent schema drift. The daemon remains
//! the authority on validation; clients can reuse these types to construct
//! valid requests and to decode the snapshot stream.

pub mod hook;
mod snapshot;

pub use hook::{is_valid_session_id, parse_hook_payload, HookEventName, HookPayload, ToolInput};
pub use snapshot::{
    ActiveTaskView, ActiveToolView, PendingToolView, PublishedOp, Snapshot, TodoProgress,
};

pub const MAX_HOOK_BODY_BYTES: usize = 64 * 1024;

/// A structured error returned by the hook-ingest endpoint.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}
