//! Watches the log-file directory tree and updates content metadata for
//! each session. Never drives a state transition directly —
//! its only indirect path into the registry is bootstrapping a session
//! that has never received a hook.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use sessiond_core::patterns::RE_TIMESTAMP;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::app::AppState;
use crate::session::{Session, TodoProgress};

const MAX_WALK_DEPTH: usize = 2;

/// Transcript files for sub-agent sidechains carry this infix and are
/// ignored by the tailer; only the primary session transcript drives
/// content metadata.
static SIDECHAIN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"-sidechain(-|\.)").unwrap());

fn is_tracked_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    path.extension().and_then(|e| e.to_str()) == Some("jsonl") && !SIDECHAIN_PATTERN.is_match(name)
}

fn session_id_from_path(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
}

/// Walks `root` once at startup, bootstrapping a registry entry for any
/// transcript that exists with no corresponding hook-originated session
/// (the daemon restarted mid-session).
pub async fn bootstrap(app: &Arc<AppState>, root: &Path) {
    let entries: Vec<PathBuf> = WalkDir::new(root)
        .max_depth(MAX_WALK_DEPTH)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.into_path())
        .filter(|path| path.is_file() && is_tracked_file(path))
        .collect();

    for path in entries {
        process_file(app, &path).await;
    }
}

/// Spawns the recursive filesystem watch. Notify's callback runs outside
/// tokio, so events are bridged through an unbounded channel into an async
/// task that applies the daemon's file-coalescing debounce.
pub fn spawn(app: Arc<AppState>, root: PathBuf) -> notify::Result<RecommendedWatcher> {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
        if let Ok(event) = event {
            for path in event.paths {
                let _ = tx.send(path);
            }
        }
    })?;
    watcher.watch(&root, RecursiveMode::Recursive)?;

    tokio::spawn(async move {
        while let Some(path) = rx.recv().await {
            if !is_tracked_file(&path) {
                continue;
            }
            let app = app.clone();
            let delay = Duration::from_millis(app.config.debounce_ms);
            app.timers.schedule_file_coalesce(path.clone(), delay, async move {
                if path.exists() {
                    process_file(&app, &path).await;
                } else {
                    handle_deletion(&app, &path).await;
                }
            });
        }
    });

    Ok(watcher)
}

async fn handle_deletion(app: &Arc<AppState>, path: &Path) {
    let Some(session_id) = session_id_from_path(path) else {
        return;
    };
    if app.registry.remove(&session_id).await.is_some() {
        app.publisher.remove(&session_id);
        debug!(session_id, "Session log removed; session evicted");
    }
}

async fn process_file(app: &Arc<AppState>, path: &Path) {
    let Some(session_id) = session_id_from_path(path) else {
        return;
    };

    let (shared, _created) = app
        .registry
        .get_or_insert_with(&session_id, || {
            Session::bootstrap_from_tailer(session_id.clone(), path.to_string_lossy().to_string(), Utc::now())
        })
        .await;

    let bytes = match fs_err::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %err, session_id, "Failed to read transcript for tailing");
            return;
        }
    };

    let mut session = shared.lock().await;
    let offset = session.log_tail_offset as usize;
    if offset > bytes.len() {
        // File was truncated/rotated underneath us; restart from scratch.
        session.log_tail_offset = 0;
    }
    let start = session.log_tail_offset as usize;
    let slice = &bytes[start.min(bytes.len())..];

    let text = String::from_utf8_lossy(slice);
    let mut consumed = 0usize;
    let mut any_update = false;

    for line in text.split_inclusive('\n') {
        if !line.ends_with('\n') {
            // Trailing partial line: leave it for the next pass.
            break;
        }
        consumed += line.len();
        if apply_line(&mut session, line.trim_end()) {
            any_update = true;
        }
    }

    session.log_tail_offset += consumed as u64;

    if any_update || session.log_file_path.is_none() {
        session.log_file_path = Some(path.to_string_lossy().to_string());
        app.publisher.publish(&session);
    }
}

/// Parses one transcript line and folds it into content metadata. Returns
/// true if any tracked field changed.
fn apply_line(session: &mut Session, line: &str) -> bool {
    if line.trim().is_empty() {
        return false;
    }

    let mut changed = false;

    match serde_json::from_str::<Value>(line) {
        Ok(value) => {
            if let Some(ts) = value.get("timestamp").and_then(Value::as_str) {
                if let Some(parsed) = parse_timestamp(ts) {
                    session.last_activity_at = Some(parsed);
                    changed = true;
                }
            }

            if is_countable_entry(&value) {
                session.message_count += 1;
                changed = true;
            }

            if let Some(todos) = value.get("todos").and_then(Value::as_array) {
                let total = todos.len() as u32;
                let completed = todos
                    .iter()
                    .filter(|t| t.get("status").and_then(Value::as_str) == Some("completed"))
                    .count() as u32;
                session.todo_progress = Some(TodoProgress { total, completed });
                changed = true;
            }
        }
        Err(_) => {
            // Tolerate a line that failed to parse structurally (e.g. read
            // mid-flush): recover at least the timestamp with the same
            // regex used for stats parsing elsewhere in the crate.
            if let Some(captures) = RE_TIMESTAMP.captures(line) {
                if let Some(parsed) = parse_timestamp(&captures[1]) {
                    session.last_activity_at = Some(parsed);
                    changed = true;
                }
            }
        }
    }

    changed
}

fn is_countable_entry(value: &Value) -> bool {
    match value.get("type").and_then(Value::as_str) {
        Some("user") => true,
        Some("assistant") => value
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_array)
            .map(|blocks| {
                blocks
                    .iter()
                    .any(|b| b.get("type").and_then(Value::as_str) == Some("tool_use"))
            })
            .unwrap_or(false),
        _ => false,
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;

    fn new_session() -> Session {
        Session::bootstrap_from_tailer("s1".to_string(), "/tmp/s1.jsonl".to_string(), Utc::now())
    }

    #[test]
    fn ignores_sidechain_files() {
        assert!(!is_tracked_file(Path::new("/x/abc-sidechain-1.jsonl")));
        assert!(is_tracked_file(Path::new("/x/abc.jsonl")));
    }

    #[test]
    fn counts_user_and_tool_use_assistant_entries() {
        let mut session = new_session();
        let user_line = r#"{"type":"user","timestamp":"2026-01-01T00:00:00Z","message":{"content":"hi"}}"#;
        let assistant_text_only = r#"{"type":"assistant","timestamp":"2026-01-01T00:00:01Z","message":{"content":[{"type":"text","text":"ok"}]}}"#;
        let assistant_tool_use = r#"{"type":"assistant","timestamp":"2026-01-01T00:00:02Z","message":{"content":[{"type":"tool_use","id":"t1","name":"Bash"}]}}"#;

        apply_line(&mut session, user_line);
        apply_line(&mut session, assistant_text_only);
        apply_line(&mut session, assistant_tool_use);

        assert_eq!(session.message_count, 2);
    }

    #[test]
    fn extracts_todo_progress_from_latest_entry() {
        let mut session = new_session();
        let line = r#"{"type":"system","timestamp":"2026-01-01T00:00:00Z","todos":[{"status":"completed"},{"status":"pending"}]}"#;
        apply_line(&mut session, line);
        let progress = session.todo_progress.as_ref().unwrap();
        assert_eq!(progress.total, 2);
        assert_eq!(progress.completed, 1);
    }

    #[test]
    fn malformed_line_recovers_timestamp_via_regex_fallback() {
        let mut session = new_session();
        let truncated = r#"{"type":"user","timestamp":"2026-01-01T00:00:05Z","message":{"content":"trunc"#;
        let changed = apply_line(&mut session, truncated);
        assert!(changed);
        assert!(session.last_activity_at.is_some());
    }

    #[test]
    fn blank_lines_are_ignored() {
        let mut session = new_session();
        assert!(!apply_line(&mut session, "   "));
    }
}
