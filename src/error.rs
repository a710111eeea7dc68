//! Error types for comfyboot
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

/// Boot config loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Include/exclude filter is not a valid regex
    #[error("Invalid regex pattern '{pattern}': {error}")]
    InvalidPattern { pattern: String, error: String },

    /// Failed to read a config file
    #[error("Failed to read config file '{path}': {error}")]
    ReadFile { path: PathBuf, error: String },

    /// Failed to parse a config file
    #[error("Failed to parse config file '{path}': {error}")]
    ParseFile { path: PathBuf, error: String },
}

/// Previous-state store errors
#[derive(Error, Debug)]
pub enum StateError {
    /// Failed to read the state file
    #[error("Failed to read state file '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// State file is not valid JSON
    #[error("Failed to parse state file '{path}': {error}")]
    Parse { path: PathBuf, error: String },

    /// Failed to write the state file
    #[error("Failed to write state file '{path}': {error}")]
    Write { path: PathBuf, error: String },
}

/// Custom node errors
#[derive(Error, Debug)]
pub enum NodeError {
    /// Config entry has neither `node_id` nor `url`
    #[error("Invalid node config. Missing 'node_id' or 'url'")]
    MissingSource,

    /// Config entry is malformed
    #[error("Invalid node config: {0}")]
    InvalidEntry(String),

    /// Git URL could not be parsed into a repository name
    #[error("Invalid git URL: {url}")]
    InvalidGitUrl { url: String },

    /// Node manager CLI reported a failure
    #[error("Failed to install node '{name}': {message}")]
    InstallFailed { name: String, message: String },

    /// Post-install setup failed
    #[error("Failed to set up node '{name}': {error}")]
    SetupFailed { name: String, error: String },

    /// Uninstall failed
    #[error("Failed to uninstall node '{name}': {error}")]
    UninstallFailed { name: String, error: String },

    /// Git clone failed
    #[error("Failed to clone node '{name}': {error}")]
    CloneFailed { name: String, error: String },

    /// Filesystem error
    #[error("IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },
}

/// Model errors
#[derive(Error, Debug)]
pub enum ModelError {
    /// Config entry is malformed
    #[error("Invalid model config: {0}")]
    InvalidEntry(String),

    /// Download failed
    #[error("Failed to download '{filename}': {source}")]
    Download {
        filename: String,
        source: DownloadError,
    },

    /// Filesystem error
    #[error("IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },
}

/// Download errors
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Network error
    #[error("Network error downloading '{url}': {error}")]
    NetworkError { url: String, error: String },

    /// Server rejected the credentials
    #[error("Authorization failed downloading '{url}': HTTP {status}")]
    Unauthorized { url: String, status: u16 },

    /// Checksum verification failed
    #[error("Checksum verification failed for '{file}'")]
    ChecksumFailed { file: String },

    /// IO error
    #[error("IO error for '{path}': {error}")]
    IoError { path: PathBuf, error: String },

    /// Max retries exceeded
    #[error("Download failed after {retries} retries: {url}")]
    MaxRetriesExceeded { url: String, retries: u32 },
}

impl DownloadError {
    /// Whether retrying the same request cannot help
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::ChecksumFailed { .. })
    }
}

/// Subprocess errors
#[derive(Error, Debug)]
pub enum ProcessError {
    /// Program could not be started
    #[error("Failed to spawn '{program}': {error}")]
    Spawn { program: String, error: String },

    /// Program exited with a non-zero status
    #[error("'{program}' exited with code {code}")]
    Failed {
        program: String,
        code: i32,
        output: String,
    },

    /// IO error while reading output
    #[error("IO error running '{program}': {error}")]
    Io { program: String, error: String },
}

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to remove directory
    #[error("Failed to remove directory '{path}': {error}")]
    RemoveDir { path: PathBuf, error: String },

    /// Failed to remove file
    #[error("Failed to remove file '{path}': {error}")]
    RemoveFile { path: PathBuf, error: String },

    /// Failed to move file
    #[error("Failed to move '{from}' to '{to}': {error}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        error: String,
    },
}

/// Top-level comfyboot error type
#[derive(Error, Debug)]
pub enum BootError {
    /// ComfyUI installation is missing
    #[error("Invalid ComfyUI path: {path}")]
    ComfyUiNotFound { path: PathBuf },

    /// Config error
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// State error
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Node error
    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    /// Model error
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Process error
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    /// Filesystem error
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] FilesystemError),
}
