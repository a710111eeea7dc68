//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Variables that would leak the host configuration into a test run
const ISOLATED_VARS: &[&str] = &[
    "WORKDIR",
    "COMFYUI_PATH",
    "COMFYUI_MN_PATH",
    "COMFYUI_EXTRA_ARGS",
    "BOOT_CONFIG_INCLUDE",
    "BOOT_CONFIG_EXCLUDE",
    "UPDATE_NODE",
    "INIT_NODE",
    "INIT_MODEL",
    "HF_API_TOKEN",
    "CIVITAI_API_TOKEN",
    "CN_NETWORK",
    "HF_ENDPOINT",
    "CIVITAI_ENDPOINT",
    "LOG_LEVEL",
    "PYTHON_BIN",
    "RUST_LOG",
];

/// Test working directory
///
/// Creates a temporary `WORKDIR` and runs the comfyboot binary against it.
pub struct TestWorkdir {
    /// Temporary directory standing in for `/workspace`
    pub dir: TempDir,
}

impl TestWorkdir {
    /// Create a new empty working directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Create a working directory with a minimal ComfyUI checkout
    #[allow(dead_code)]
    pub fn with_comfyui() -> Self {
        let workdir = Self::new();
        workdir.create_file("comfyui/main.py", "");
        workdir
    }

    /// Get the path to the working directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Create a file in the working directory
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Create a directory in the working directory
    #[allow(dead_code)]
    pub fn create_dir(&self, name: &str) {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(path).expect("Failed to create directory");
    }

    /// Check if a file exists in the working directory
    #[allow(dead_code)]
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Read a file from the working directory
    #[allow(dead_code)]
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Run comfyboot with `args` and extra environment
    pub fn run(&self, args: &[&str], envs: &[(&str, &str)]) -> Output {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_comfyboot"));
        for var in ISOLATED_VARS {
            cmd.env_remove(var);
        }
        cmd.env("WORKDIR", self.dir.path());
        cmd.envs(envs.iter().copied());
        cmd.args(args);
        cmd.output().expect("Failed to execute comfyboot")
    }
}

impl Default for TestWorkdir {
    fn default() -> Self {
        Self::new()
    }
}

/// Stdout of a finished run
#[allow(dead_code)]
pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Stderr of a finished run
#[allow(dead_code)]
pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Boot config declaring two nodes and one model
#[allow(dead_code)]
pub const SAMPLE_CONFIG: &str = r#"
[[custom_nodes]]
node_id = "comfyui-kjnodes"
version = "1.0.5"

[[custom_nodes]]
url = "https://github.com/cubiq/ComfyUI_essentials.git"

[[models]]
url = "https://huggingface.co/org/repo/resolve/main/vae.safetensors"
filename = "vae.safetensors"
dir = "models/vae"
"#;
