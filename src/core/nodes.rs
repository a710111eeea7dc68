//! Custom node synchronization
//!
//! Turns `custom_nodes` config entries into typed nodes, diffs them against
//! the previous boot and drives installs and removals through a
//! [`NodeBackend`].

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::defaults::{DEFAULT_NODE_VERSION, EXCLUDED_NODES};
use crate::core::progress::{print_list_tree, warn_list_tree, Progress};
use crate::core::url::{git_repo_name, preprocess_url, HostRewrites};
use crate::error::NodeError;
use crate::infra::filesystem;
use crate::infra::git;
use crate::infra::manager_cli::{InstallOutcome, ManagerCli};

/// Where a node comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeSource {
    /// Comfy registry, installed through cm-cli
    Registry,
    /// Git repository, cloned directly
    Git,
}

impl fmt::Display for NodeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registry => write!(f, "registry"),
            Self::Git => write!(f, "git"),
        }
    }
}

/// A custom node, identified by name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Registry id or lowercased repository name
    pub name: String,
    /// Install source
    pub source: NodeSource,
    /// Registry version, or git branch
    #[serde(default)]
    pub version: Option<String>,
    /// Git remote
    #[serde(default)]
    pub url: Option<String>,
    /// Post-install script
    #[serde(default)]
    pub script: Option<PathBuf>,
    /// Install location
    pub path: PathBuf,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Node {}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.source)?;
        match self.version.as_deref() {
            Some(version) if version != DEFAULT_NODE_VERSION => write!(f, " @ {version}"),
            _ => Ok(()),
        }
    }
}

impl Node {
    /// Whether the node is managed outside of the boot config
    pub fn is_excluded(&self) -> bool {
        EXCLUDED_NODES.contains(&self.name.as_str())
    }

    /// Whether the node is installed
    ///
    /// A file in place of the node dir, or a git node dir that is not a
    /// repository, is removed and reported as absent.
    pub fn check_exists(&self) -> bool {
        if self.path.is_file() {
            tracing::warn!("{} path invalid, removing: {}", self.name, self.path.display());
            if let Err(e) = filesystem::remove_file(&self.path) {
                tracing::error!("{e}");
            }
            return false;
        }
        if !self.path.is_dir() {
            return false;
        }
        if self.source == NodeSource::Git && !git::is_valid_repo(&self.path) {
            tracing::warn!("{} not a valid git repo, removing: {}", self.name, self.path.display());
            if let Err(e) = filesystem::remove_dir_all(&self.path) {
                tracing::error!("{e}");
            }
            return false;
        }
        true
    }
}

/// Raw `custom_nodes` entry
#[derive(Debug, Deserialize)]
struct NodeEntry {
    node_id: Option<String>,
    url: Option<String>,
    version: Option<String>,
    branch: Option<String>,
    script: Option<String>,
}

/// Builds nodes from config entries relative to an installation
#[derive(Debug, Clone)]
pub struct NodeFactory {
    custom_nodes_dir: PathBuf,
    scripts_dir: PathBuf,
    rewrites: Option<HostRewrites>,
}

impl NodeFactory {
    /// Create a factory placing nodes under `custom_nodes_dir`
    pub fn new(custom_nodes_dir: PathBuf, scripts_dir: PathBuf, rewrites: Option<HostRewrites>) -> Self {
        Self {
            custom_nodes_dir,
            scripts_dir,
            rewrites,
        }
    }

    /// Parse one config entry
    pub fn from_entry(&self, value: &toml::Value) -> Result<Node, NodeError> {
        let entry: NodeEntry = value
            .clone()
            .try_into()
            .map_err(|e: toml::de::Error| NodeError::InvalidEntry(e.message().to_string()))?;
        let script = entry.script.map(|s| self.scripts_dir.join(s));

        if let Some(node_id) = entry.node_id.filter(|id| !id.trim().is_empty()) {
            let name = node_id.trim().to_string();
            return Ok(Node {
                path: self.custom_nodes_dir.join(&name),
                name,
                source: NodeSource::Registry,
                version: Some(
                    entry
                        .version
                        .unwrap_or_else(|| DEFAULT_NODE_VERSION.to_string()),
                ),
                url: None,
                script,
            });
        }

        if let Some(raw) = entry.url {
            let url = preprocess_url(&raw, self.rewrites.as_ref()).map_err(NodeError::InvalidEntry)?;
            let name = git_repo_name(&url).ok_or_else(|| NodeError::InvalidGitUrl { url: url.clone() })?;
            return Ok(Node {
                path: self.custom_nodes_dir.join(&name),
                name,
                source: NodeSource::Git,
                version: entry.branch,
                url: Some(url),
                script,
            });
        }

        Err(NodeError::MissingSource)
    }

    /// Re-anchor a node recorded by a previous boot to this installation
    pub fn rebase(&self, mut node: Node) -> Node {
        node.path = self.custom_nodes_dir.join(&node.name);
        node
    }

    /// Parse every entry, skipping invalid ones and dropping duplicates
    pub fn load(&self, entries: &[toml::Value]) -> Vec<Node> {
        let nodes = entries
            .iter()
            .filter_map(|entry| match self.from_entry(entry) {
                Ok(node) => Some(node),
                Err(e) => {
                    tracing::warn!("Skip invalid node config: {e}\n{entry}");
                    None
                }
            })
            .collect();
        dedupe(nodes)
    }

    /// Re-anchor previously recorded nodes, dropping duplicates
    pub fn load_previous(&self, nodes: &[Node]) -> Vec<Node> {
        dedupe(nodes.iter().cloned().map(|n| self.rebase(n)).collect())
    }
}

/// Keep the first node of each name, warning about the rest
fn dedupe(nodes: Vec<Node>) -> Vec<Node> {
    let mut unique: Vec<Node> = Vec::with_capacity(nodes.len());
    let mut duplicates: Vec<Node> = Vec::new();
    for node in nodes {
        if unique.contains(&node) {
            if !duplicates.contains(&node) {
                duplicates.push(node);
            }
        } else {
            unique.push(node);
        }
    }
    if !duplicates.is_empty() {
        tracing::warn!("Found {} duplicate nodes:", duplicates.len());
        warn_list_tree(&duplicates);
    }
    unique
}

/// What a node sync will do
#[derive(Debug, Clone, Default)]
pub struct NodePlan {
    /// Nodes to install
    pub install: Vec<Node>,
    /// Nodes to remove
    pub remove: Vec<Node>,
    /// Run setup for nodes already on disk
    pub setup_existing: bool,
}

impl NodePlan {
    /// Whether there is nothing to do
    pub fn is_empty(&self) -> bool {
        self.install.is_empty() && self.remove.is_empty()
    }
}

/// Diff the configured nodes against the previous boot
///
/// Without a previous boot every node is installed, and nodes already on
/// disk get their setup re-run.
pub fn plan_nodes(current: &[Node], previous: &[Node]) -> NodePlan {
    if previous.is_empty() {
        return NodePlan {
            install: current.to_vec(),
            remove: Vec::new(),
            setup_existing: true,
        };
    }
    NodePlan {
        install: current.iter().filter(|n| !previous.contains(n)).cloned().collect(),
        remove: previous.iter().filter(|n| !current.contains(n)).cloned().collect(),
        setup_existing: false,
    }
}

/// Node installation and removal primitives
#[allow(async_fn_in_trait)]
pub trait NodeBackend {
    /// Install a registry node at `version`
    async fn install_registry(&self, node_id: &str, version: &str) -> Result<InstallOutcome, NodeError>;

    /// Uninstall a registry node
    async fn uninstall_registry(&self, node_id: &str) -> Result<(), NodeError>;

    /// Clone a git node into `dest`
    async fn clone_repo(&self, url: &str, branch: Option<&str>, dest: &Path) -> Result<(), NodeError>;

    /// Run the node's setup (dependencies, install scripts)
    async fn post_install(&self, node_path: &Path) -> Result<(), NodeError>;

    /// Update every installed node
    async fn update_all(&self) -> Result<(), NodeError>;

    /// Run a post-install script; true on success
    async fn run_script(&self, script: &Path) -> bool;
}

/// Backend driving cm-cli and gix
#[derive(Debug, Clone)]
pub struct ManagerBackend {
    cli: ManagerCli,
}

impl ManagerBackend {
    /// Create a backend around a cm-cli wrapper
    pub fn new(cli: ManagerCli) -> Self {
        Self { cli }
    }
}

impl NodeBackend for ManagerBackend {
    async fn install_registry(&self, node_id: &str, version: &str) -> Result<InstallOutcome, NodeError> {
        self.cli
            .install(node_id, version)
            .await
            .map_err(|e| NodeError::InstallFailed {
                name: node_id.to_string(),
                message: e.to_string(),
            })
    }

    async fn uninstall_registry(&self, node_id: &str) -> Result<(), NodeError> {
        self.cli
            .uninstall(node_id)
            .await
            .map_err(|e| NodeError::UninstallFailed {
                name: node_id.to_string(),
                error: e.to_string(),
            })
    }

    async fn clone_repo(&self, url: &str, branch: Option<&str>, dest: &Path) -> Result<(), NodeError> {
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let clone_err = |error: String| NodeError::CloneFailed {
            name: name.clone(),
            error,
        };
        let (url, branch, dest) = (url.to_string(), branch.map(String::from), dest.to_path_buf());
        let result = tokio::task::spawn_blocking(move || git::clone_repo(&url, branch.as_deref(), &dest))
            .await
            .map_err(|e| clone_err(e.to_string()))?
            .map_err(|e| clone_err(e.to_string()))?;
        tracing::debug!("Cloned {} at {}", result.path.display(), result.commit_sha);
        Ok(())
    }

    async fn post_install(&self, node_path: &Path) -> Result<(), NodeError> {
        self.cli
            .post_install(node_path)
            .await
            .map_err(|e| NodeError::SetupFailed {
                name: node_path.display().to_string(),
                error: e.to_string(),
            })
    }

    async fn update_all(&self) -> Result<(), NodeError> {
        self.cli.update_all().await.map_err(|e| NodeError::InstallFailed {
            name: "all".to_string(),
            message: e.to_string(),
        })
    }

    async fn run_script(&self, script: &Path) -> bool {
        if !script.is_file() {
            tracing::warn!("Invalid script path: {}", script.display());
            return false;
        }
        match self.cli.runner().run_script(script).await {
            Ok(Some(output)) if output.success() => {
                tracing::info!("Successfully executed script: {}", script.display());
                true
            }
            Ok(Some(output)) => {
                tracing::warn!("{} exited with non-zero code: {}", script.display(), output.code);
                false
            }
            Ok(None) => {
                tracing::warn!("Unsupported script type: {}. Skipped.", script.display());
                false
            }
            Err(e) => {
                tracing::error!("Failed to execute script {}: {e}", script.display());
                false
            }
        }
    }
}

/// Result of a single node operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOutcome {
    /// Installed, set up or removed
    Done,
    /// Already in the desired state
    Unchanged,
    /// Failed; retried next boot
    Failed,
}

/// Results of a node sync
#[derive(Debug, Clone, Default)]
pub struct NodeReport {
    /// Newly installed (or set up) nodes
    pub installed: Vec<Node>,
    /// Removed nodes
    pub removed: Vec<Node>,
    /// Nodes already present
    pub existed: Vec<Node>,
    /// Failed installs and removals
    pub failed: Vec<Node>,
    /// Nodes to record as applied
    pub state: Vec<Node>,
    /// Configured nodes that ended up in place
    pub succeeded: usize,
    /// Configured node count
    pub total: usize,
}

/// Synchronizes custom nodes through a backend
#[derive(Debug)]
pub struct NodeSync<B> {
    backend: B,
}

impl<B: NodeBackend> NodeSync<B> {
    /// Create a synchronizer over `backend`
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Backend in use
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Install `node`
    pub async fn install(&self, node: &Node, setup_existing: bool) -> NodeOutcome {
        if node.is_excluded() {
            tracing::warn!("{} is excluded from installation. Skipped.", node.name);
            return NodeOutcome::Unchanged;
        }
        if node.check_exists() {
            if !setup_existing {
                tracing::info!("{} already exists. Skipped.", node.name);
                return NodeOutcome::Unchanged;
            }
            tracing::warn!("{} already exists, trying to setup...", node.name);
            return match self.backend.post_install(&node.path).await {
                Ok(()) => {
                    tracing::info!("Successfully initialized node: {}", node.name);
                    NodeOutcome::Done
                }
                Err(e) => {
                    tracing::error!("Failed to initialize node {}: {e}", node.name);
                    NodeOutcome::Failed
                }
            };
        }

        tracing::info!("Installing node: {}", node.name);
        match self.install_missing(node).await {
            Ok(NodeOutcome::Done) => {
                tracing::info!("Successfully installed node: {}", node.name);
            }
            Ok(outcome) => return outcome,
            Err(e) => {
                tracing::error!("Failed to install node {}: {e}", node.name);
                return NodeOutcome::Failed;
            }
        }

        if let Some(script) = &node.script {
            tracing::info!("Executing post-install-node script: {}", script.display());
            self.backend.run_script(script).await;
        }
        NodeOutcome::Done
    }

    async fn install_missing(&self, node: &Node) -> Result<NodeOutcome, NodeError> {
        match node.source {
            NodeSource::Registry => {
                let version = node.version.as_deref().unwrap_or(DEFAULT_NODE_VERSION);
                match self.backend.install_registry(&node.name, version).await? {
                    InstallOutcome::Installed => Ok(NodeOutcome::Done),
                    InstallOutcome::Skipped => {
                        tracing::info!("{} already exists. Skipped.", node.name);
                        Ok(NodeOutcome::Unchanged)
                    }
                    InstallOutcome::Enabled => {
                        tracing::warn!("{} already exists, but just enabled.", node.name);
                        Ok(NodeOutcome::Unchanged)
                    }
                    InstallOutcome::Failed(message) => Err(NodeError::InstallFailed {
                        name: node.name.clone(),
                        message,
                    }),
                }
            }
            NodeSource::Git => {
                let url = node.url.as_deref().ok_or(NodeError::MissingSource)?;
                self.backend
                    .clone_repo(url, node.version.as_deref(), &node.path)
                    .await?;
                if let Err(e) = self.backend.post_install(&node.path).await {
                    filesystem::remove_dir_all(&node.path).map_err(|fe| NodeError::Io {
                        path: node.path.clone(),
                        error: fe.to_string(),
                    })?;
                    return Err(e);
                }
                Ok(NodeOutcome::Done)
            }
        }
    }

    /// Remove `node`
    pub async fn remove(&self, node: &Node) -> NodeOutcome {
        if node.is_excluded() {
            tracing::warn!("{} is excluded from removal. Skipped.", node.name);
            return NodeOutcome::Unchanged;
        }
        if !node.check_exists() {
            tracing::info!("{} not found. Skipped.", node.name);
            return NodeOutcome::Unchanged;
        }

        tracing::info!("Removing node: {}", node.name);
        let result = async {
            if node.source == NodeSource::Registry {
                self.backend.uninstall_registry(&node.name).await?;
            }
            filesystem::remove_dir_all(&node.path).map_err(|e| NodeError::Io {
                path: node.path.clone(),
                error: e.to_string(),
            })
        }
        .await;

        match result {
            Ok(()) => {
                tracing::info!("Uninstalled node: {}", node.name);
                NodeOutcome::Done
            }
            Err(e) => {
                tracing::error!("Failed to uninstall node {}: {e}", node.name);
                NodeOutcome::Failed
            }
        }
    }

    /// Update every installed node; failures are logged only
    pub async fn update_all(&self) -> bool {
        tracing::info!("Updating all installed nodes...");
        match self.backend.update_all().await {
            Ok(()) => {
                tracing::info!(
                    "Successfully executed node update command. You may need to check actual node status."
                );
                true
            }
            Err(e) => {
                tracing::error!("Failed to execute node update command: {e}");
                false
            }
        }
    }

    /// Bring installed nodes in line with `current`
    ///
    /// Returns `None` when nothing is configured or nothing changed.
    pub async fn sync(&self, current: &[Node], previous: &[Node]) -> Option<NodeReport> {
        if current.is_empty() {
            tracing::info!("No nodes in config");
            return None;
        }
        let plan = plan_nodes(current, previous);
        if plan.is_empty() {
            tracing::info!("No nodes config changes to proceed.");
            return None;
        }

        let mut report = NodeReport {
            total: current.len(),
            ..NodeReport::default()
        };
        let mut failed_removals = Vec::new();
        let mut failed_installs = 0;

        if !plan.install.is_empty() {
            tracing::info!("Installing {} nodes:", plan.install.len());
            print_list_tree(&plan.install);
            let mut progress = Progress::new(plan.install.len());
            for node in &plan.install {
                progress.advance();
                tracing::info!("{progress} {node}");
                match self.install(node, plan.setup_existing).await {
                    NodeOutcome::Done => report.installed.push(node.clone()),
                    NodeOutcome::Unchanged => report.existed.push(node.clone()),
                    NodeOutcome::Failed => {
                        failed_installs += 1;
                        report.failed.push(node.clone());
                    }
                }
            }
        }

        if !plan.remove.is_empty() {
            tracing::info!("Removing {} nodes:", plan.remove.len());
            print_list_tree(&plan.remove);
            let mut progress = Progress::new(plan.remove.len());
            for node in &plan.remove {
                progress.advance();
                tracing::info!("{progress} {node}");
                match self.remove(node).await {
                    NodeOutcome::Done => report.removed.push(node.clone()),
                    NodeOutcome::Unchanged => {}
                    NodeOutcome::Failed => {
                        report.failed.push(node.clone());
                        failed_removals.push(node.clone());
                    }
                }
            }
        }

        report.state = current
            .iter()
            .filter(|n| !report.failed.contains(n))
            .cloned()
            .chain(failed_removals)
            .collect();
        report.succeeded = report.total - failed_installs;
        Some(report)
    }
}
