//! Fatal errors that abort the process. Per-session errors never surface
//! here — they are swallowed at their call site (see ingest/tailer).

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("could not resolve home directory")]
    NoHomeDir,

    #[error("failed to create state directory {0}: {1}")]
    StateDirCreate(PathBuf, std::io::Error),

    #[error("failed to bind hook listener on port {0}: {1}")]
    HookBind(u16, std::io::Error),

    #[error("failed to bind stream listener on port {0}: {1}")]
    StreamBind(u16, std::io::Error),

    #[error("failed to set up log directory watch on {0}: {1}")]
    WatchSetup(PathBuf, notify::Error),
}
