//! Boot sequence and ComfyUI launch
//!
//! Runs hooks and synchronizers in their fixed order, logs a summary, then
//! starts ComfyUI and relays termination signals to it.

use std::path::Path;
use std::process::ExitStatus;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::Child;
use tokio::signal::unix::{signal, SignalKind};

use crate::config::Settings;
use crate::core::boot_config::{load_boot_config, BootConfig};
use crate::core::hooks::{run_hook_dir, HookReport};
use crate::core::models::{Model, ModelAuth, ModelFactory, ModelReport, ModelSync};
use crate::core::nodes::{ManagerBackend, Node, NodeFactory, NodeReport, NodeSync};
use crate::core::state::{BootState, StateStore};
use crate::error::{BootError, ProcessError};
use crate::infra::download::DownloadManager;
use crate::infra::manager_cli::ManagerCli;
use crate::infra::process::ProcessRunner;

/// Config and previous state resolved into nodes and models
#[derive(Debug)]
pub struct BootInputs {
    /// Merged boot config
    pub config: BootConfig,
    /// Configured nodes
    pub nodes: Vec<Node>,
    /// Nodes applied by the last boot
    pub previous_nodes: Vec<Node>,
    /// Configured models
    pub models: Vec<Model>,
    /// Models applied by the last boot
    pub previous_models: Vec<Model>,
}

impl BootInputs {
    /// Load config entries and rebase the previous state onto current paths
    pub fn load(settings: &Settings, previous: &BootState) -> Self {
        let config = load_boot_config(
            &settings.config_dir(),
            settings.config_include.as_deref(),
            settings.config_exclude.as_deref(),
        );
        Self::resolve(settings, config, previous)
    }

    /// Resolve an already loaded config against `previous`
    pub fn resolve(settings: &Settings, config: BootConfig, previous: &BootState) -> Self {
        let node_factory = NodeFactory::new(
            settings.custom_nodes_dir(),
            settings.post_install_node_dir(),
            settings.host_rewrites(),
        );
        let model_factory = ModelFactory::new(settings.comfyui_path.clone());

        Self {
            nodes: node_factory.load(config.custom_nodes()),
            previous_nodes: node_factory.load_previous(&previous.custom_nodes),
            models: model_factory.load(config.models()),
            previous_models: model_factory.load_previous(&previous.models),
            config,
        }
    }
}

/// What one boot did
#[derive(Debug, Clone, Default)]
pub struct BootSummary {
    /// Whether node sync was enabled
    pub init_node: bool,
    /// Whether model sync was enabled
    pub init_model: bool,
    /// Node sync results, `None` when it did not run
    pub nodes: Option<NodeReport>,
    /// Model sync results, `None` when it did not run
    pub models: Option<ModelReport>,
    /// Pre-init hook results
    pub pre_init: HookReport,
    /// Post-init hook results
    pub post_init: HookReport,
}

impl BootSummary {
    /// Info lines and warning lines describing the boot
    pub fn lines(&self) -> (Vec<String>, Vec<String>) {
        let mut info = Vec::new();
        let mut warnings = Vec::new();

        match (&self.nodes, self.init_node) {
            (_, false) => info.push("Nodes: initialization disabled".to_string()),
            (None, true) => info.push("Nodes: No config changes, initialization skipped".to_string()),
            (Some(report), true) => {
                info.push(format!("Nodes: {}/{} success:", report.succeeded, report.total));
                push_count(&mut info, "Installed", report.installed.len());
                push_count(&mut info, "Removed", report.removed.len());
                push_count(&mut info, "Existed", report.existed.len());
                if !report.failed.is_empty() {
                    warnings.push(format!(
                        "{} node operations failed, will retry on next boot:",
                        report.failed.len()
                    ));
                    warnings.extend(report.failed.iter().map(|n| format!("└─ {n}")));
                }
            }
        }

        match (&self.models, self.init_model) {
            (_, false) => info.push("Models: initialization disabled".to_string()),
            (None, true) => {
                info.push("Models: No config changes, initialization skipped".to_string());
            }
            (Some(report), true) => {
                info.push(format!("Models: {}/{} success:", report.succeeded, report.total));
                push_count(&mut info, "Downloaded", report.downloaded.len());
                push_count(&mut info, "Moved", report.moved.len());
                push_count(&mut info, "Removed", report.removed.len());
                push_count(&mut info, "Existed", report.existed.len());
                if !report.failed.is_empty() {
                    warnings.push(format!(
                        "{} model operations failed, will retry on next boot:",
                        report.failed.len()
                    ));
                    warnings.extend(report.failed.iter().map(|m| format!("└─ {m}")));
                }
            }
        }

        for (stage, hooks) in [("pre-init", &self.pre_init), ("post-init", &self.post_init)] {
            if !hooks.failed.is_empty() {
                warnings.push(format!(
                    "{}/{} {stage} scripts failed",
                    hooks.failed.len(),
                    hooks.total()
                ));
            }
        }

        (info, warnings)
    }

    /// Log the summary
    pub fn log(&self) {
        let (info, warnings) = self.lines();
        tracing::info!("Initialization summary:");
        for line in info {
            tracing::info!("{line}");
        }
        for line in warnings {
            tracing::warn!("{line}");
        }
    }
}

fn push_count(lines: &mut Vec<String>, label: &str, count: usize) {
    if count > 0 {
        lines.push(format!("└─ {label}: {count}"));
    }
}

/// Fail unless the ComfyUI directory exists
pub fn validate_comfyui(settings: &Settings) -> Result<(), BootError> {
    if settings.has_comfyui() {
        Ok(())
    } else {
        Err(BootError::ComfyUiNotFound {
            path: settings.comfyui_path.clone(),
        })
    }
}

/// Process runner carrying the child environment
pub fn process_runner(settings: &Settings) -> ProcessRunner {
    ProcessRunner::new(settings.python.clone(), settings.child_env())
}

/// Run every boot step before the launch
pub async fn initialize(settings: &Settings) -> Result<BootSummary, BootError> {
    validate_comfyui(settings)?;
    for warning in settings.token_warnings() {
        tracing::warn!("{warning}");
    }

    let runner = process_runner(settings);
    let mut store = StateStore::open(&settings.state_path());
    let inputs = BootInputs::load(settings, store.previous());

    let mut summary = BootSummary {
        init_node: settings.init_node,
        init_model: settings.init_model,
        ..BootSummary::default()
    };

    summary.pre_init = run_hook_dir(&runner, &settings.pre_init_dir(), "pre-init").await;

    let node_sync = NodeSync::new(ManagerBackend::new(ManagerCli::new(
        runner.clone(),
        settings.manager_cli(),
    )));

    if settings.update_node {
        if store.previous().is_empty() {
            tracing::info!("No previous state, skipping node update");
        } else {
            node_sync.update_all().await;
        }
    }

    if settings.init_node {
        summary.nodes = node_sync.sync(&inputs.nodes, &inputs.previous_nodes).await;
        if let Some(report) = &summary.nodes {
            if let Err(e) = store.record_nodes(report.state.clone()) {
                tracing::error!("{e}");
            }
        }
    } else {
        tracing::info!("Node initialization disabled");
    }

    if settings.init_model {
        let model_sync = ModelSync::new(
            DownloadManager::new(),
            ModelAuth {
                hf_token: settings.hf_token.clone(),
                civitai_token: settings.civitai_token.clone(),
            },
            settings.host_rewrites(),
        );
        summary.models = model_sync.sync(&inputs.models, &inputs.previous_models).await;
        if let Some(report) = &summary.models {
            if let Err(e) = store.record_models(report.state.clone()) {
                tracing::error!("{e}");
            }
        }
    } else {
        tracing::info!("Model initialization disabled");
    }

    summary.post_init = run_hook_dir(&runner, &settings.post_init_dir(), "post-init").await;

    summary.log();
    Ok(summary)
}

/// Arguments passed to ComfyUI's `main.py`
pub fn launch_args(listen: &str, port: u16, extra: &[String]) -> Vec<String> {
    let mut args = vec![
        "main.py".to_string(),
        "--listen".to_string(),
        listen.to_string(),
        "--port".to_string(),
        port.to_string(),
    ];
    args.extend(extra.iter().cloned());
    args
}

/// Start ComfyUI and wait for it, relaying SIGTERM and SIGINT
///
/// Returns ComfyUI's exit code.
pub async fn launch(settings: &Settings, listen: &str, port: u16) -> Result<i32, BootError> {
    validate_comfyui(settings)?;
    let runner = process_runner(settings);
    let args = launch_args(listen, port, &settings.extra_args);
    tracing::info!("Starting ComfyUI: {} {}", runner.python(), args.join(" "));

    let spawn_err = |e: std::io::Error| ProcessError::Spawn {
        program: runner.python().to_string(),
        error: e.to_string(),
    };
    let mut child = runner
        .command(runner.python())
        .args(&args)
        .current_dir(&settings.comfyui_path)
        .spawn()
        .map_err(spawn_err)?;

    let mut sigterm = signal(SignalKind::terminate()).map_err(spawn_err)?;
    let mut sigint = signal(SignalKind::interrupt()).map_err(spawn_err)?;

    loop {
        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| ProcessError::Io {
                    program: runner.python().to_string(),
                    error: e.to_string(),
                })?;
                let code = exit_code(status);
                tracing::info!("ComfyUI exited with code {code}");
                return Ok(code);
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, stopping ComfyUI...");
                terminate(&mut child);
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, stopping ComfyUI...");
                terminate(&mut child);
            }
        }
    }
}

/// Forward SIGTERM to ComfyUI, killing it only if the signal cannot be sent
fn terminate(child: &mut Child) {
    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => {
            tracing::error!("Failed to send SIGTERM to ComfyUI ({pid}): {e}, killing it");
            if let Err(e) = child.start_kill() {
                tracing::error!("Failed to stop ComfyUI: {e}");
            }
        }
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(1)
}

/// Whether `dir` looks like a ComfyUI checkout
pub fn has_entry_point(dir: &Path) -> bool {
    dir.join("main.py").is_file()
}
