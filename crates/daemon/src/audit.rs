//! Per-session append-only audit log: one line per hook event, one line
//! per state transition. Best-effort — a failed append is swallowed, never
//! propagated to the caller.

use std::path::{Path, PathBuf};

use fs_err as fs;
use fs_err::OpenOptions;
use std::io::Write as _;
use tracing::warn;

use sessiond_protocol::is_valid_session_id;

pub fn audit_dir(state_dir: &Path) -> PathBuf {
    state_dir.join("logs")
}

fn audit_log_path(state_dir: &Path, session_id: &str) -> PathBuf {
    audit_dir(state_dir).join(format!("{session_id}.log"))
}

fn append_line(state_dir: &Path, session_id: &str, line: &str) {
    let dir = audit_dir(state_dir);
    if let Err(err) = fs::create_dir_all(&dir) {
        warn!(error = %err, session_id, "Failed to create audit log directory");
        return;
    }
    let path = audit_log_path(state_dir, session_id);
    let result = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .and_then(|mut file| writeln!(file, "{line}"));
    if let Err(err) = result {
        warn!(error = %err, session_id, "Failed to append to audit log");
    }
}

/// `[hook] <name>` — emitted for every received hook, including
/// logging-only ones.
pub fn append_hook(state_dir: &Path, session_id: &str, hook_event_name: &str) {
    append_line(state_dir, session_id, &format!("[hook] {hook_event_name}"));
}

/// `[init] <state>` — emitted exactly once, when a session is first
/// created.
pub fn append_init(state_dir: &Path, session_id: &str, initial_state: &str) {
    append_line(state_dir, session_id, &format!("[init] {initial_state}"));
}

/// `prev -> next event:E source:S [tool:T]` — emitted for every committed
/// transition.
pub fn append_transition(
    state_dir: &Path,
    session_id: &str,
    prev: &str,
    next: &str,
    event: &str,
    source: &str,
    tool: Option<&str>,
) {
    let mut line = format!("{prev} -> {next} event:{event} source:{source}");
    if let Some(tool) = tool {
        line.push_str(&format!(" tool:{tool}"));
    }
    append_line(state_dir, session_id, &line);
}

#[derive(Debug)]
pub enum ReadLogError {
    InvalidSessionId,
    NotFound,
    Io(std::io::Error),
}

/// Reads the full audit log for `session_id`. Rejects any id containing
/// path-traversal characters before ever touching the filesystem.
pub fn read_log(state_dir: &Path, session_id: &str) -> Result<String, ReadLogError> {
    if !is_valid_session_id(session_id) {
        return Err(ReadLogError::InvalidSessionId);
    }
    let path = audit_log_path(state_dir, session_id);
    match fs::read_to_string(&path) {
        Ok(contents) => Ok(contents),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(ReadLogError::NotFound),
        Err(err) => Err(ReadLogError::Io(err.into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_and_reads_back() {
        let temp = tempfile::tempdir().unwrap();
        append_init(temp.path(), "s1", "working");
        append_hook(temp.path(), "s1", "UserPromptSubmit");
        append_transition(temp.path(), "s1", "working", "waiting", "STOP", "hook", None);

        let contents = read_log(temp.path(), "s1").unwrap();
        assert!(contents.contains("[init] working"));
        assert!(contents.contains("[hook] UserPromptSubmit"));
        assert!(contents.contains("working -> waiting event:STOP source:hook"));
    }

    #[test]
    fn rejects_path_traversal_ids() {
        let temp = tempfile::tempdir().unwrap();
        for bad in ["../etc/passwd", "a/b", "a\\b", "a.b", "a\0b"] {
            assert!(matches!(
                read_log(temp.path(), bad),
                Err(ReadLogError::InvalidSessionId)
            ));
        }
    }

    #[test]
    fn unknown_session_is_not_found() {
        let temp = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_log(temp.path(), "never-seen"),
            Err(ReadLogError::NotFound)
        ));
    }
}
