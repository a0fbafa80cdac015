//! The hook ingest payload: `POST /hook` request body.
//!
//! Unlike the daemon's legacy IPC envelope, hook payloads intentionally
//! accept unknown extra fields (the agent adds new optional fields over
//! time and we must not 400 on them) and only `hookEventName` + `sessionId`
//! are required.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ErrorInfo;

/// Recognized `hookEventName` values. Unknown values fail validation with a
/// `SchemaMismatch` error; see `HookPayload::validate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum HookEventName {
    SessionStart,
    UserPromptSubmit,
    PreToolUse,
    PermissionRequest,
    PostToolUse,
    PostToolUseFailure,
    Stop,
    SessionEnd,
    PreCompact,
    Notification,
    SubagentStart,
    SubagentStop,
    TeammateIdle,
    TaskCompleted,
}

impl HookEventName {
    /// Logging-only hooks are appended to the audit log but never drive the
    /// transition function.
    pub fn is_logging_only(self) -> bool {
        matches!(
            self,
            HookEventName::SessionStart
                | HookEventName::SubagentStart
                | HookEventName::SubagentStop
                | HookEventName::TeammateIdle
                | HookEventName::TaskCompleted
                | HookEventName::Notification
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HookEventName::SessionStart => "SessionStart",
            HookEventName::UserPromptSubmit => "UserPromptSubmit",
            HookEventName::PreToolUse => "PreToolUse",
            HookEventName::PermissionRequest => "PermissionRequest",
            HookEventName::PostToolUse => "PostToolUse",
            HookEventName::PostToolUseFailure => "PostToolUseFailure",
            HookEventName::Stop => "Stop",
            HookEventName::SessionEnd => "SessionEnd",
            HookEventName::PreCompact => "PreCompact",
            HookEventName::Notification => "Notification",
            HookEventName::SubagentStart => "SubagentStart",
            HookEventName::SubagentStop => "SubagentStop",
            HookEventName::TeammateIdle => "TeammateIdle",
            HookEventName::TaskCompleted => "TaskCompleted",
        }
    }
}

/// Recognized inner keys of `toolInput`. Everything else is preserved in
/// `extra` so a future tool-specific field isn't silently dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolInput {
    #[serde(default, rename = "filePath")]
    pub file_path: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default, rename = "subagentType")]
    pub subagent_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// The full `POST /hook` request body. Extra unrecognized top-level fields
/// are accepted silently (no `deny_unknown_fields`), so a newer hook
/// client can send fields this daemon doesn't yet know about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookPayload {
    #[serde(rename = "hookEventName")]
    pub hook_event_name: HookEventName,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(default, rename = "transcriptPath")]
    pub transcript_path: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default, rename = "toolName")]
    pub tool_name: Option<String>,
    #[serde(default, rename = "toolUseId")]
    pub tool_use_id: Option<String>,
    #[serde(default, rename = "toolInput")]
    pub tool_input: Option<ToolInput>,
    #[serde(default, rename = "permissionMode")]
    pub permission_mode: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, rename = "agentId")]
    pub agent_id: Option<String>,
    #[serde(default, rename = "agentType")]
    pub agent_type: Option<String>,
}

/// `sessionId` must be a non-empty token of this alphabet — also used by the
/// `GET /logs/{sessionId}` path-traversal check.
pub fn is_valid_session_id(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl HookPayload {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        if !is_valid_session_id(&self.session_id) {
            return Err(ErrorInfo::new(
                "invalid_session_id",
                "sessionId must be a non-empty string matching [A-Za-z0-9_-]+",
            ));
        }
        Ok(())
    }
}

/// Parses and validates a raw JSON body into a `HookPayload`.
///
/// Distinguishes `InvalidRequest` (malformed JSON, missing required field)
/// from `SchemaMismatch` (unrecognized `hookEventName`) only in the error
/// code, since both map to HTTP 400 at the call site.
pub fn parse_hook_payload(body: &[u8]) -> Result<HookPayload, ErrorInfo> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|err| ErrorInfo::new("invalid_json", format!("body was not valid JSON: {err}")))?;

    let payload: HookPayload = serde_json::from_value(value).map_err(|err| {
        ErrorInfo::new(
            "schema_mismatch",
            format!("payload did not match the hook schema: {err}"),
        )
    })?;

    payload.validate()?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_unknown_extra_fields() {
        let body = br#"{"hookEventName":"Stop","sessionId":"abc","futureField":42}"#;
        let payload = parse_hook_payload(body).expect("should parse");
        assert_eq!(payload.session_id, "abc");
    }

    #[test]
    fn rejects_unknown_hook_event_name() {
        let body = br#"{"hookEventName":"Bogus","sessionId":"abc"}"#;
        assert!(parse_hook_payload(body).is_err());
    }

    #[test]
    fn rejects_missing_session_id() {
        let body = br#"{"hookEventName":"Stop"}"#;
        assert!(parse_hook_payload(body).is_err());
    }

    #[test]
    fn rejects_session_id_with_path_separators() {
        let body = br#"{"hookEventName":"Stop","sessionId":"../etc"}"#;
        assert!(parse_hook_payload(body).is_err());
    }

    #[test]
    fn tool_input_keeps_recognized_and_extra_fields() {
        let body = br#"{
            "hookEventName":"PreToolUse",
            "sessionId":"abc",
            "toolName":"Task",
            "toolUseId":"t1",
            "toolInput":{"subagentType":"Bash","description":"Run tests","somethingElse":true}
        }"#;
        let payload = parse_hook_payload(body).expect("should parse");
        let tool_input = payload.tool_input.expect("tool_input present");
        assert_eq!(tool_input.subagent_type.as_deref(), Some("Bash"));
        assert_eq!(tool_input.description.as_deref(), Some("Run tests"));
        assert!(tool_input.extra.contains_key("somethingElse"));
    }

    #[test]
    fn logging_only_classification() {
        assert!(HookEventName::SessionStart.is_logging_only());
        assert!(HookEventName::Notification.is_logging_only());
        assert!(!HookEventName::Stop.is_logging_only());
        assert!(!HookEventName::PreToolUse.is_logging_only());
    }
}
