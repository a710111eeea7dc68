//! Runtime settings
//!
//! Every knob of the boot sequence is an environment variable. Settings are
//! resolved through a lookup function so callers (and tests) decide where the
//! values come from.

use std::path::PathBuf;

use crate::config::defaults;
use crate::config::urls;
use crate::core::url::{netloc, HostRewrites};

/// Resolved boot settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root of all boot paths (`WORKDIR`)
    pub workdir: PathBuf,
    /// ComfyUI installation (`COMFYUI_PATH`)
    pub comfyui_path: PathBuf,
    /// Node manager directory (`COMFYUI_MN_PATH`)
    pub manager_path: PathBuf,
    /// Extra ComfyUI launch arguments (`COMFYUI_EXTRA_ARGS`)
    pub extra_args: Vec<String>,
    /// Config file include regex (`BOOT_CONFIG_INCLUDE`)
    pub config_include: Option<String>,
    /// Config file exclude regex (`BOOT_CONFIG_EXCLUDE`)
    pub config_exclude: Option<String>,
    /// Update all nodes before syncing (`UPDATE_NODE`)
    pub update_node: bool,
    /// Synchronize custom nodes (`INIT_NODE`)
    pub init_node: bool,
    /// Synchronize models (`INIT_MODEL`)
    pub init_model: bool,
    /// Hugging Face token (`HF_API_TOKEN`)
    pub hf_token: Option<String>,
    /// Civitai token (`CIVITAI_API_TOKEN`)
    pub civitai_token: Option<String>,
    /// Use mainland-China mirrors (`CN_NETWORK`)
    pub cn_network: bool,
    /// Hugging Face endpoint (`HF_ENDPOINT`)
    pub hf_endpoint: String,
    /// Civitai endpoint (`CIVITAI_ENDPOINT`)
    pub civitai_endpoint: String,
    /// Log level (`LOG_LEVEL`)
    pub log_level: String,
    /// Python interpreter (`PYTHON_BIN`)
    pub python: String,
}

impl Settings {
    /// Resolve settings from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings from an arbitrary variable lookup
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let get_bool = |key: &str, default: bool| parse_bool(get(key).as_deref(), default);

        let workdir = get("WORKDIR")
            .map_or_else(|| PathBuf::from(defaults::DEFAULT_WORKDIR), PathBuf::from);
        let comfyui_path = get("COMFYUI_PATH")
            .map_or_else(|| workdir.join(defaults::COMFYUI_DIR), PathBuf::from);
        let manager_path = get("COMFYUI_MN_PATH").map_or_else(
            || comfyui_path.join("custom_nodes").join(defaults::MANAGER_DIR),
            PathBuf::from,
        );

        let cn_network = get_bool("CN_NETWORK", false);
        let (hf_default, civitai_default) = if cn_network {
            (urls::HF_MIRROR_ENDPOINT, urls::CIVITAI_MIRROR_ENDPOINT)
        } else {
            (urls::HF_ENDPOINT, urls::CIVITAI_ENDPOINT)
        };

        Self {
            extra_args: get("COMFYUI_EXTRA_ARGS")
                .map(|args| args.split_whitespace().map(String::from).collect())
                .unwrap_or_default(),
            config_include: get("BOOT_CONFIG_INCLUDE"),
            config_exclude: get("BOOT_CONFIG_EXCLUDE"),
            update_node: get_bool("UPDATE_NODE", false),
            init_node: get_bool("INIT_NODE", true),
            init_model: get_bool("INIT_MODEL", true),
            hf_token: get("HF_API_TOKEN"),
            civitai_token: get("CIVITAI_API_TOKEN"),
            cn_network,
            hf_endpoint: get("HF_ENDPOINT").unwrap_or_else(|| hf_default.to_string()),
            civitai_endpoint: get("CIVITAI_ENDPOINT")
                .unwrap_or_else(|| civitai_default.to_string()),
            log_level: get("LOG_LEVEL")
                .unwrap_or_else(|| defaults::DEFAULT_LOG_LEVEL.to_string()),
            python: get("PYTHON_BIN").unwrap_or_else(|| defaults::DEFAULT_PYTHON.to_string()),
            workdir,
            comfyui_path,
            manager_path,
        }
    }

    /// Boot config directory
    pub fn config_dir(&self) -> PathBuf {
        self.workdir.join(defaults::BOOT_CONFIG_DIR)
    }

    /// Previous-state file
    pub fn state_path(&self) -> PathBuf {
        self.workdir.join(defaults::STATE_FILE)
    }

    fn scripts_dir(&self, stage: &str) -> PathBuf {
        self.workdir.join(defaults::SCRIPTS_DIR).join(stage)
    }

    /// Scripts run before node sync
    pub fn pre_init_dir(&self) -> PathBuf {
        self.scripts_dir(defaults::PRE_INIT_DIR)
    }

    /// Per-node post-install scripts
    pub fn post_install_node_dir(&self) -> PathBuf {
        self.scripts_dir(defaults::POST_INSTALL_NODE_DIR)
    }

    /// Scripts run after model sync
    pub fn post_init_dir(&self) -> PathBuf {
        self.scripts_dir(defaults::POST_INIT_DIR)
    }

    /// Directory holding installed custom nodes
    pub fn custom_nodes_dir(&self) -> PathBuf {
        self.comfyui_path.join("custom_nodes")
    }

    /// Node manager CLI script
    pub fn manager_cli(&self) -> PathBuf {
        self.manager_path.join(defaults::MANAGER_CLI)
    }

    /// Host rewrites applied to config URLs, only with `CN_NETWORK`
    pub fn host_rewrites(&self) -> Option<HostRewrites> {
        if !self.cn_network {
            return None;
        }
        Some(HostRewrites::new(&self.hf_endpoint, &self.civitai_endpoint))
    }

    /// Environment passed to every child process
    pub fn child_env(&self) -> Vec<(String, String)> {
        let mut env = Vec::new();
        if self.cn_network {
            env.push(("PIP_INDEX_URL".to_string(), urls::PIP_MIRROR_INDEX.to_string()));
        }
        env
    }

    /// Warnings for tokens that would leave the official endpoints
    pub fn token_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let checks = [
            ("HF_API_TOKEN", &self.hf_token, &self.hf_endpoint, urls::HF_ENDPOINT),
            (
                "CIVITAI_API_TOKEN",
                &self.civitai_token,
                &self.civitai_endpoint,
                urls::CIVITAI_ENDPOINT,
            ),
        ];
        for (var, token, endpoint, official) in checks {
            if token.is_none() {
                continue;
            }
            let host = reqwest::Url::parse(endpoint).ok().map(|u| netloc(&u).to_lowercase());
            let official_host = reqwest::Url::parse(official).ok().map(|u| netloc(&u));
            if host != official_host {
                warnings.push(format!("{var} will be sent to a third party endpoint: {endpoint}"));
            }
        }
        warnings
    }

    /// Whether the ComfyUI installation looks usable
    pub fn has_comfyui(&self) -> bool {
        self.comfyui_path.is_dir()
    }
}

/// Parse a boolean environment value, falling back to `default` when the
/// value is missing or unrecognized
pub fn parse_bool(value: Option<&str>, default: bool) -> bool {
    let Some(value) = value else {
        return default;
    };
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "t" | "yes" | "y" => true,
        "false" | "0" | "f" | "no" | "n" => false,
        _ => default,
    }
}
