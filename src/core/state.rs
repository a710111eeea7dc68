//! Previous-state store
//!
//! Records which nodes and models the last boot applied successfully, so the
//! next boot can diff against it. Categories that were not synchronized carry
//! over from the previous state unchanged.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::models::Model;
use crate::core::nodes::Node;
use crate::error::StateError;

/// Persisted boot state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootState {
    /// Nodes applied by the last boot
    #[serde(default)]
    pub custom_nodes: Vec<Node>,
    /// Models applied by the last boot
    #[serde(default)]
    pub models: Vec<Model>,
}

impl BootState {
    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.custom_nodes.is_empty() && self.models.is_empty()
    }
}

/// Loads the previous state and persists the current one
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    previous: BootState,
    current: BootState,
}

impl StateStore {
    /// Open the store at `path`, loading any previous state
    ///
    /// A directory in place of the state file is removed; an unreadable or
    /// malformed file is logged and treated as no previous state.
    pub fn open(path: &Path) -> Self {
        let previous = match load_state(path) {
            Ok(state) => state,
            Err(e) => {
                tracing::error!("Failed to load previous state: {e}");
                BootState::default()
            }
        };
        Self {
            path: path.to_path_buf(),
            current: previous.clone(),
            previous,
        }
    }

    /// State file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// State recorded by the last boot
    pub fn previous(&self) -> &BootState {
        &self.previous
    }

    /// State being recorded by this boot
    pub fn current(&self) -> &BootState {
        &self.current
    }

    /// Replace the node category and persist
    pub fn record_nodes(&mut self, nodes: Vec<Node>) -> Result<(), StateError> {
        self.current.custom_nodes = nodes;
        tracing::debug!("Updated current state: {:?}", self.current);
        self.write()
    }

    /// Replace the model category and persist
    pub fn record_models(&mut self, models: Vec<Model>) -> Result<(), StateError> {
        self.current.models = models;
        tracing::debug!("Updated current state: {:?}", self.current);
        self.write()
    }

    /// Write the current state to disk
    pub fn write(&self) -> Result<(), StateError> {
        let write_err = |error: String| StateError::Write {
            path: self.path.clone(),
            error,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }
        let content =
            serde_json::to_string_pretty(&self.current).map_err(|e| write_err(e.to_string()))?;
        std::fs::write(&self.path, &content).map_err(|e| write_err(e.to_string()))?;
        tracing::info!("Current state saved to {}", self.path.display());
        tracing::debug!("Saved state file content: {content}");
        Ok(())
    }
}

/// Read the state file
pub fn load_state(path: &Path) -> Result<BootState, StateError> {
    if path.is_dir() {
        tracing::warn!("Detected invalid previous state, removing...");
        std::fs::remove_dir_all(path).map_err(|e| StateError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        return Ok(BootState::default());
    }
    if !path.is_file() {
        tracing::info!("No previous state found");
        return Ok(BootState::default());
    }

    tracing::info!("Detected previous state, loading...");
    let content = std::fs::read_to_string(path).map_err(|e| StateError::Read {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;
    let state: BootState = serde_json::from_str(&content).map_err(|e| StateError::Parse {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;
    tracing::debug!("Loaded previous state: {state:?}");
    Ok(state)
}

/// Read the state file without repairing anything
///
/// Anything other than a readable, well-formed file yields an empty state.
pub fn peek_state(path: &Path) -> BootState {
    if !path.is_file() {
        return BootState::default();
    }
    std::fs::read_to_string(path)
        .ok()
        .and_then(|content| serde_json::from_str(&content).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::nodes::NodeSource;
    use tempfile::TempDir;

    fn sample_node(name: &str) -> Node {
        Node {
            name: name.to_string(),
            source: NodeSource::Registry,
            version: Some("nightly".to_string()),
            url: None,
            script: None,
            path: PathBuf::from("/workspace/comfyui/custom_nodes").join(name),
        }
    }

    #[test]
    fn test_missing_state_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::open(&temp.path().join(".cache/prev-state.json"));
        assert!(store.previous().is_empty());
        assert!(store.current().is_empty());
    }

    #[test]
    fn test_round_trip_through_disk() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".cache/prev-state.json");

        let mut store = StateStore::open(&path);
        store.record_nodes(vec![sample_node("comfyui-impact-pack")]).unwrap();
        assert!(path.is_file());

        let reopened = StateStore::open(&path);
        assert_eq!(reopened.previous().custom_nodes.len(), 1);
        assert_eq!(reopened.previous().custom_nodes[0].name, "comfyui-impact-pack");
    }

    #[test]
    fn test_unsynced_category_carries_over() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");

        let mut first = StateStore::open(&path);
        first.record_nodes(vec![sample_node("a")]).unwrap();

        let mut second = StateStore::open(&path);
        second.record_models(Vec::new()).unwrap();

        let third = StateStore::open(&path);
        assert_eq!(third.previous().custom_nodes.len(), 1);
    }

    #[test]
    fn test_directory_state_is_removed() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("prev-state.json");
        std::fs::create_dir_all(path.join("junk")).unwrap();

        let store = StateStore::open(&path);
        assert!(store.previous().is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn test_peek_leaves_directory_in_place() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("prev-state.json");
        std::fs::create_dir(&path).unwrap();

        assert!(peek_state(&path).is_empty());
        assert!(path.is_dir());
    }

    #[test]
    fn test_malformed_state_is_ignored() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("prev-state.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(load_state(&path), Err(StateError::Parse { .. })));
        let store = StateStore::open(&path);
        assert!(store.previous().is_empty());
    }
}
