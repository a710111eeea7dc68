//! Git operations
//!
//! Clones custom node repositories and validates existing checkouts using the
//! gix crate.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Git operation errors
#[derive(Error, Debug)]
pub enum GitError {
    /// Failed to clone repository
    #[error("Failed to clone '{url}': {error}")]
    CloneFailed { url: String, error: String },

    /// Branch name is not a valid ref name
    #[error("Invalid branch '{branch}': {error}")]
    InvalidBranch { branch: String, error: String },

    /// IO error
    #[error("IO error for '{path}': {error}")]
    IoError { path: PathBuf, error: String },

    /// Invalid repository
    #[error("Invalid repository at '{path}': {error}")]
    InvalidRepository { path: PathBuf, error: String },
}

/// Result of a git clone operation
#[derive(Debug, Clone)]
pub struct CloneResult {
    /// Path to the cloned repository
    pub path: PathBuf,
    /// Commit checked out in the worktree
    pub commit_sha: String,
}

/// Clone `url` into `dest`, checking out `branch` when given
///
/// Anything already at `dest` is removed first; a failed clone leaves no
/// directory behind.
pub fn clone_repo(url: &str, branch: Option<&str>, dest: &Path) -> Result<CloneResult, GitError> {
    if dest.exists() {
        std::fs::remove_dir_all(dest).map_err(|e| GitError::IoError {
            path: dest.to_path_buf(),
            error: e.to_string(),
        })?;
    }

    if let Err(e) = clone_internal(url, branch, dest) {
        let _ = std::fs::remove_dir_all(dest);
        return Err(e);
    }

    let commit_sha = head_sha(dest)?;
    Ok(CloneResult {
        path: dest.to_path_buf(),
        commit_sha,
    })
}

fn clone_internal(url: &str, branch: Option<&str>, dest: &Path) -> Result<(), GitError> {
    let clone_err = |error: String| GitError::CloneFailed {
        url: url.to_string(),
        error,
    };

    let mut prepare = gix::prepare_clone(url, dest).map_err(|e| clone_err(e.to_string()))?;

    if let Some(branch) = branch {
        prepare = prepare
            .with_ref_name(Some(branch))
            .map_err(|e| GitError::InvalidBranch {
                branch: branch.to_string(),
                error: e.to_string(),
            })?;
    }

    let (mut checkout, _outcome) = prepare
        .fetch_then_checkout(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
        .map_err(|e| clone_err(e.to_string()))?;

    checkout
        .main_worktree(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
        .map_err(|e| clone_err(e.to_string()))?;

    Ok(())
}

/// Whether `path` is a readable git repository
pub fn is_valid_repo(path: &Path) -> bool {
    gix::open(path).is_ok()
}

/// Commit SHA of HEAD in the repository at `repo_path`
pub fn head_sha(repo_path: &Path) -> Result<String, GitError> {
    let invalid = |error: String| GitError::InvalidRepository {
        path: repo_path.to_path_buf(),
        error,
    };
    let repo = gix::open(repo_path).map_err(|e| invalid(e.to_string()))?;
    let id = repo.head_id().map_err(|e| invalid(e.to_string()))?;
    Ok(id.to_hex().to_string())
}
