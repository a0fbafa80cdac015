//! Resolves a working directory to its git identity.
//!
//! Out of scope per the system's external-collaborator boundary, but the
//! daemon still needs *some* implementation to run standalone: this is a
//! filesystem-only prober (no shelling out to `git`) with an in-memory TTL
//! cache and the persistent on-disk JSON cache described in the external
//! interfaces.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use fs_err as fs;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::boundaries::find_project_boundary;

const CACHE_TTL: Duration = Duration::from_secs(60);

/// Everything the publisher needs to annotate a session's git identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitProbeResult {
    pub repo_root_path: Option<String>,
    pub repo_url: Option<String>,
    pub repo_id: Option<String>,
    pub branch: Option<String>,
    pub is_worktree: bool,
    pub worktree_root: Option<String>,
}

/// Persisted shape: branch is deliberately excluded — it changes too often
/// to be worth caching to disk and is cheap to re-read.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedEntry {
    #[serde(rename = "repoRootPath", skip_serializing_if = "Option::is_none")]
    repo_root_path: Option<String>,
    #[serde(rename = "repoUrl", skip_serializing_if = "Option::is_none")]
    repo_url: Option<String>,
    #[serde(rename = "repoId", skip_serializing_if = "Option::is_none")]
    repo_id: Option<String>,
    #[serde(rename = "isWorktree")]
    is_worktree: bool,
    #[serde(rename = "worktreeRoot", skip_serializing_if = "Option::is_none")]
    worktree_root: Option<String>,
}

pub trait GitProbe: Send + Sync {
    fn probe(&self, cwd: &str) -> GitProbeResult;
}

pub struct FilesystemGitProbe {
    disk_cache_path: PathBuf,
    memory: Mutex<HashMap<String, (Instant, GitProbeResult)>>,
}

impl FilesystemGitProbe {
    pub fn new(disk_cache_path: PathBuf) -> Self {
        Self {
            disk_cache_path,
            memory: Mutex::new(HashMap::new()),
        }
    }

    fn load_disk_entry(&self, cwd: &str) -> Option<PersistedEntry> {
        let all = load_disk_cache(&self.disk_cache_path);
        all.get(cwd).cloned()
    }

    fn persist(&self, cwd: &str, result: &GitProbeResult) {
        let mut all = load_disk_cache(&self.disk_cache_path);
        all.insert(
            cwd.to_string(),
            PersistedEntry {
                repo_root_path: result.repo_root_path.clone(),
                repo_url: result.repo_url.clone(),
                repo_id: result.repo_id.clone(),
                is_worktree: result.is_worktree,
                worktree_root: result.worktree_root.clone(),
            },
        );
        if let Err(err) = save_disk_cache(&self.disk_cache_path, &all) {
            warn!(error = %err, "Failed to persist git-info cache");
        }
    }
}

impl GitProbe for FilesystemGitProbe {
    fn probe(&self, cwd: &str) -> GitProbeResult {
        if let Some((observed, cached)) = self.memory.lock().unwrap().get(cwd) {
            if observed.elapsed() < CACHE_TTL {
                return cached.clone();
            }
        }

        if let Some(entry) = self.load_disk_entry(cwd) {
            let branch = resolve_git_info(Path::new(cwd))
                .and_then(|info| read_branch(&info.common_dir, &info.worktree_root));
            let result = GitProbeResult {
                repo_root_path: entry.repo_root_path,
                repo_url: entry.repo_url,
                repo_id: entry.repo_id,
                branch,
                is_worktree: entry.is_worktree,
                worktree_root: entry.worktree_root,
            };
            self.memory
                .lock()
                .unwrap()
                .insert(cwd.to_string(), (Instant::now(), result.clone()));
            return result;
        }

        let result = resolve(cwd);
        self.memory
            .lock()
            .unwrap()
            .insert(cwd.to_string(), (Instant::now(), result.clone()));
        self.persist(cwd, &result);
        result
    }
}

fn resolve(cwd: &str) -> GitProbeResult {
    let git_info = resolve_git_info(Path::new(cwd));

    match git_info {
        Some(info) => GitProbeResult {
            repo_root_path: Some(path_to_string(&info.repo_root)),
            repo_url: read_remote_url(&info.common_dir),
            repo_id: Some(repo_id_for(&info.common_dir)),
            branch: read_branch(&info.common_dir, &info.worktree_root),
            is_worktree: info.is_worktree,
            worktree_root: if info.is_worktree {
                Some(path_to_string(&info.worktree_root))
            } else {
                None
            },
        },
        None => {
            // Not a git repo. Fall back to a project-marker boundary so
            // sessions in non-git projects are still grouped sensibly.
            let repo_root_path = find_project_boundary(cwd).map(|b| b.path);
            GitProbeResult {
                repo_root_path,
                ..GitProbeResult::default()
            }
        }
    }
}

fn repo_id_for(common_dir: &Path) -> String {
    let canonical = canonicalize_path(common_dir);
    #[cfg(target_os = "macos")]
    let source = canonical.to_string_lossy().to_lowercase();
    #[cfg(not(target_os = "macos"))]
    let source = canonical.to_string_lossy().to_string();
    format!("{:x}", md5::compute(source))
}

fn read_remote_url(common_dir: &Path) -> Option<String> {
    let config_path = common_dir.join("config");
    let contents = fs::read_to_string(config_path).ok()?;
    let mut in_origin = false;
    for line in contents.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            in_origin = trimmed == "[remote \"origin\"]";
            continue;
        }
        if in_origin {
            if let Some(rest) = trimmed.strip_prefix("url") {
                if let Some(value) = rest.trim_start().strip_prefix('=') {
                    return Some(value.trim().to_string());
                }
            }
        }
    }
    None
}

fn read_branch(common_dir: &Path, worktree_root: &Path) -> Option<String> {
    // Worktree HEADs live alongside the worktree's own gitdir, not the
    // common dir, when the worktree has its own `.git/worktrees/<name>/HEAD`.
    let candidates = [
        common_dir.join("worktrees").join(
            worktree_root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
        ),
        common_dir.to_path_buf(),
    ];

    for candidate in candidates {
        let head_path = candidate.join("HEAD");
        if let Ok(contents) = fs::read_to_string(&head_path) {
            let trimmed = contents.trim();
            if let Some(branch_ref) = trimmed.strip_prefix("ref: refs/heads/") {
                return Some(branch_ref.to_string());
            }
            if !trimmed.is_empty() && head_path.exists() {
                return None; // detached HEAD
            }
        }
    }
    None
}

fn load_disk_cache(path: &Path) -> HashMap<String, PersistedEntry> {
    match fs::read(path) {
        Ok(data) => serde_json::from_slice(&data).unwrap_or_default(),
        Err(_) => HashMap::new(),
    }
}

fn save_disk_cache(path: &Path, entries: &HashMap<String, PersistedEntry>) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| err.to_string())?;
    }
    let payload = serde_json::to_vec_pretty(entries).map_err(|err| err.to_string())?;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, payload).map_err(|err| err.to_string())?;
    fs::rename(&tmp_path, path).map_err(|err| err.to_string())?;
    Ok(())
}

#[derive(Debug, Clone)]
struct GitInfo {
    worktree_root: PathBuf,
    repo_root: PathBuf,
    common_dir: PathBuf,
    is_worktree: bool,
}

fn resolve_git_info(path: &Path) -> Option<GitInfo> {
    let start = if path.is_dir() {
        path.to_path_buf()
    } else {
        path.parent()?.to_path_buf()
    };

    let mut current = Some(start);
    while let Some(dir) = current {
        let git_entry = dir.join(".git");
        if git_entry.exists() {
            if git_entry.is_dir() {
                let repo_root = canonicalize_path(&dir);
                let common_dir = canonicalize_path(&git_entry);
                return Some(GitInfo {
                    worktree_root: repo_root.clone(),
                    repo_root,
                    common_dir,
                    is_worktree: false,
                });
            }

            let git_dir = parse_gitdir(&git_entry, &dir)?;
            if let Some(common_dir) = parse_commondir(&git_dir) {
                let repo_root = common_dir.parent().unwrap_or(&dir).to_path_buf();
                return Some(GitInfo {
                    worktree_root: canonicalize_path(&dir),
                    repo_root: canonicalize_path(&repo_root),
                    common_dir: canonicalize_path(&common_dir),
                    is_worktree: true,
                });
            }

            return Some(GitInfo {
                worktree_root: canonicalize_path(&dir),
                repo_root: canonicalize_path(&dir),
                common_dir: canonicalize_path(&git_dir),
                is_worktree: false,
            });
        }

        let parent = dir.parent().map(|p| p.to_path_buf());
        if parent.as_ref() == Some(&dir) {
            break;
        }
        current = parent;
    }

    None
}

fn parse_gitdir(git_file: &Path, worktree_root: &Path) -> Option<PathBuf> {
    let contents = fs::read_to_string(git_file).ok()?;
    let line = contents
        .lines()
        .find(|line| line.to_ascii_lowercase().starts_with("gitdir:"))?;
    let raw = line.get("gitdir:".len()..)?.trim();
    if raw.is_empty() {
        return None;
    }
    Some(resolve_git_path(worktree_root, raw))
}

fn parse_commondir(git_dir: &Path) -> Option<PathBuf> {
    let commondir_path = git_dir.join("commondir");
    let contents = fs::read_to_string(commondir_path).ok()?;
    let raw = contents.trim();
    if raw.is_empty() {
        return None;
    }
    Some(resolve_git_path(git_dir, raw))
}

fn resolve_git_path(base: &Path, raw: &str) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() {
        canonicalize_path(path)
    } else {
        canonicalize_path(&base.join(path))
    }
}

fn canonicalize_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_repo(root: &Path) {
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(
            root.join(".git").join("HEAD"),
            "ref: refs/heads/main\n",
        )
        .unwrap();
        std::fs::write(
            root.join(".git").join("config"),
            "[remote \"origin\"]\n\turl = git@example.com:acme/widgets.git\n",
        )
        .unwrap();
    }

    #[test]
    fn resolves_branch_and_remote_for_plain_repo() {
        let temp = tempfile::tempdir().unwrap();
        let repo_root = temp.path().join("widgets");
        std::fs::create_dir_all(&repo_root).unwrap();
        init_repo(&repo_root);

        let result = resolve(repo_root.to_str().unwrap());
        assert_eq!(result.branch.as_deref(), Some("main"));
        assert_eq!(
            result.repo_url.as_deref(),
            Some("git@example.com:acme/widgets.git")
        );
        assert!(!result.is_worktree);
    }

    #[test]
    fn non_git_directory_falls_back_to_project_boundary() {
        let temp = tempfile::tempdir().unwrap();
        let project = temp.path().join("proj");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(project.join("package.json"), "{}").unwrap();

        let result = resolve(project.to_str().unwrap());
        assert!(result.repo_url.is_none());
        assert!(!result.is_worktree);
        assert_eq!(
            result.repo_root_path.as_deref(),
            Some(project.to_str().unwrap())
        );
    }

    #[test]
    fn ttl_cache_returns_same_result_without_rereading_disk() {
        let temp = tempfile::tempdir().unwrap();
        let repo_root = temp.path().join("widgets");
        std::fs::create_dir_all(&repo_root).unwrap();
        init_repo(&repo_root);

        let cache_path = temp.path().join("git-cache.json");
        let probe = FilesystemGitProbe::new(cache_path);
        let first = probe.probe(repo_root.to_str().unwrap());
        let second = probe.probe(repo_root.to_str().unwrap());
        assert_eq!(first, second);
    }

    #[test]
    fn disk_cache_round_trips() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("git-cache.json");
        let mut entries = HashMap::new();
        entries.insert(
            "/repo".to_string(),
            PersistedEntry {
                repo_root_path: Some("/repo".to_string()),
                repo_url: Some("git@example.com:acme/widgets.git".to_string()),
                repo_id: Some("abc123".to_string()),
                is_worktree: false,
                worktree_root: None,
            },
        );
        save_disk_cache(&path, &entries).unwrap();
        let loaded = load_disk_cache(&path);
        assert_eq!(loaded.get("/repo").unwrap().repo_id.as_deref(), Some("abc123"));
    }

    #[test]
    fn missing_disk_cache_is_treated_as_empty() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("does-not-exist.json");
        assert!(load_disk_cache(&path).is_empty());
    }
}
