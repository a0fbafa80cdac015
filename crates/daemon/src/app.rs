//! Process-wide shared state, handed to every hook handler, timer
//! callback, and tailer event as a cheaply-cloned `Arc`.

use std::path::PathBuf;
use std::sync::Arc;

use sessiond_core::config::DaemonConfig;

use crate::git_probe::{FilesystemGitProbe, GitProbe};
use crate::publisher::Publisher;
use crate::registry::Registry;
use crate::summarizer::{NullSummarizer, Summarizer};
use crate::timers::TimerManager;

pub struct AppState {
    pub registry: Registry,
    pub publisher: Publisher,
    pub timers: TimerManager,
    pub config: DaemonConfig,
    pub state_dir: PathBuf,
    pub git_probe: Arc<dyn GitProbe>,
    pub summarizer: Arc<dyn Summarizer>,
}

impl AppState {
    pub fn new(config: DaemonConfig, state_dir: PathBuf) -> Self {
        let git_cache_path = state_dir.join("git-cache.json");
        Self {
            registry: Registry::new(),
            publisher: Publisher::new(),
            timers: TimerManager::new(),
            config,
            state_dir,
            git_probe: Arc::new(FilesystemGitProbe::new(git_cache_path)),
            summarizer: Arc::new(NullSummarizer),
        }
    }

    #[cfg(test)]
    pub fn for_tests(state_dir: PathBuf) -> Self {
        Self::new(DaemonConfig::default(), state_dir)
    }
}
