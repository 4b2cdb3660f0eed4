//! Lightweight git repository discovery.
//!
//! Commands that declare a git-repo precondition only need to know whether
//! the working directory sits inside a repository and, when it does, a few
//! display facts. No git plumbing beyond reading `.git/HEAD`.

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct GitInfo {
    pub root: PathBuf,
    pub branch: Option<String>,
}

/// Walks from `start` toward the filesystem root looking for a `.git`
/// directory. Returns `None` outside a repository.
pub fn discover(start: &Path) -> Option<GitInfo> {
    let mut current = Some(start);
    while let Some(dir) = current {
        let git_dir = dir.join(".git");
        if git_dir.is_dir() {
            return Some(GitInfo {
                root: dir.to_path_buf(),
                branch: read_branch(&git_dir),
            });
        }
        current = dir.parent();
    }
    None
}

fn read_branch(git_dir: &Path) -> Option<String> {
    let head = fs::read_to_string(git_dir.join("HEAD")).ok()?;
    let head = head.trim();
    head.strip_prefix("ref: refs/heads/")
        .map(str::to_string)
        // Detached HEAD: show the abbreviated commit instead.
        .or_else(|| Some(head.chars().take(12).collect()))
}
