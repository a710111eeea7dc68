//! Filesystem operations
//!
//! Removal and move helpers shared by the node and model synchronizers.

use std::path::Path;

use crate::error::FilesystemError;

/// Create a directory and all parent directories
pub fn create_dir_all(path: &Path) -> Result<(), FilesystemError> {
    std::fs::create_dir_all(path).map_err(|e| FilesystemError::CreateDir {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Remove a directory and all its contents
pub fn remove_dir_all(path: &Path) -> Result<(), FilesystemError> {
    if path.exists() {
        std::fs::remove_dir_all(path).map_err(|e| FilesystemError::RemoveDir {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
    }
    Ok(())
}

/// Remove a file if it exists
pub fn remove_file(path: &Path) -> Result<(), FilesystemError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FilesystemError::RemoveFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        }),
    }
}

/// Remove whatever is at `path`, file or directory
pub fn remove_path(path: &Path) -> Result<(), FilesystemError> {
    if path.is_dir() && !path.is_symlink() {
        remove_dir_all(path)
    } else {
        remove_file(path)
    }
}

/// Move a file, creating the destination's parent directories
pub fn move_file(from: &Path, to: &Path) -> Result<(), FilesystemError> {
    if let Some(parent) = to.parent() {
        create_dir_all(parent)?;
    }
    std::fs::rename(from, to).map_err(|e| FilesystemError::Rename {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        error: e.to_string(),
    })
}

/// Ensure `path` is a directory if anything exists there
///
/// A regular file in its place is deleted. Returns whether the directory
/// exists afterwards.
pub fn clear_non_dir(path: &Path, label: &str) -> Result<bool, FilesystemError> {
    if path.is_file() {
        tracing::warn!("Detected invalid {label} path {}, removing...", path.display());
        remove_file(path)?;
        return Ok(false);
    }
    Ok(path.is_dir())
}
