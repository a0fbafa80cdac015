//! Configuration: well-known paths and the daemon's tunables.
//!
//! Tunables carry their documented defaults so `sessiond --help` and the
//! programmatic default are always the same value.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{CoreError, Result};

/// Returns the path to the Claude directory (`~/.claude`).
pub fn get_claude_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|h| h.join(".claude"))
        .ok_or(CoreError::ClaudeDirNotFound)
}

/// Returns the directory the daemon keeps its own state in
/// (`~/.claude/sessiond`): audit logs, the git-info disk cache, the startup
/// backoff counter.
pub fn get_daemon_state_dir() -> Result<PathBuf> {
    get_claude_dir().map(|d| d.join("sessiond"))
}

/// Returns the directory tree of per-session transcript log files that the
/// log tailer watches. Conventionally `~/.claude/projects`.
pub fn get_log_root_dir() -> Result<PathBuf> {
    get_claude_dir().map(|d| d.join("projects"))
}

/// Daemon tunables: hook/stream ports and the timing knobs for debounce,
/// permission delay, and the stale-check sweep.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonConfig {
    pub hook_port: u16,
    pub stream_port: u16,
    pub debounce_ms: u64,
    pub permission_delay_ms: u64,
    pub stale_check_interval_ms: u64,
    pub stale_threshold_ms: u64,
    pub idle_display_threshold_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            hook_port: 4451,
            stream_port: 4450,
            debounce_ms: 200,
            permission_delay_ms: 3000,
            stale_check_interval_ms: 10_000,
            stale_threshold_ms: 60_000,
            idle_display_threshold_ms: 3_600_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = DaemonConfig::default();
        assert_eq!(config.hook_port, 4451);
        assert_eq!(config.stream_port, 4450);
        assert_eq!(config.debounce_ms, 200);
        assert_eq!(config.permission_delay_ms, 3000);
        assert_eq!(config.stale_check_interval_ms, 10_000);
        assert_eq!(config.stale_threshold_ms, 60_000);
        assert_eq!(config.idle_display_threshold_ms, 3_600_000);
    }
}
