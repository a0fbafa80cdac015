//! Error types for `sessiond-core` operations.

/// All errors that can occur in `sessiond-core` operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("could not determine the Claude home directory (no $HOME)")]
    ClaudeDirNotFound,
}

/// Convenience type alias for `Result`s using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;
