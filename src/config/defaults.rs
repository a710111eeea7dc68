//! Default configuration values

/// Default working directory inside the container
pub const DEFAULT_WORKDIR: &str = "/workspace";

/// ComfyUI directory name under the working directory
pub const COMFYUI_DIR: &str = "comfyui";

/// Node manager directory name under `custom_nodes`
pub const MANAGER_DIR: &str = "comfyui-manager";

/// Node manager CLI entry point
pub const MANAGER_CLI: &str = "cm-cli.py";

/// Boot config directory name under the working directory
pub const BOOT_CONFIG_DIR: &str = "boot_config";

/// Previous-state file, relative to the working directory
pub const STATE_FILE: &str = ".cache/prev-state.json";

/// Hook scripts root, relative to the working directory
pub const SCRIPTS_DIR: &str = "scripts";

/// Hook stage directory names
pub const PRE_INIT_DIR: &str = "pre-init";
pub const POST_INSTALL_NODE_DIR: &str = "post-install-node";
pub const POST_INIT_DIR: &str = "post-init";

/// Nodes the boot sync never installs or removes
pub const EXCLUDED_NODES: &[&str] = &["comfyui-manager"];

/// Registry version used when a node entry has none
pub const DEFAULT_NODE_VERSION: &str = "nightly";

/// Default ComfyUI listen address
pub const DEFAULT_LISTEN: &str = "0.0.0.0,::";

/// Default ComfyUI port
pub const DEFAULT_PORT: u16 = 8188;

/// Default Python interpreter
pub const DEFAULT_PYTHON: &str = "python3";

/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "INFO";

/// Maximum number of download attempts
pub const MAX_DOWNLOAD_RETRIES: u32 = 3;

/// Initial delay between download attempts (in milliseconds)
pub const DOWNLOAD_RETRY_DELAY_MS: u64 = 2000;
