//! Lifecycle hook scripts
//!
//! Runs the `*.py` and `*.sh` scripts of a hook directory in path order.

use std::path::{Path, PathBuf};

use crate::core::progress::{print_list_tree, Progress};
use crate::infra::filesystem;
use crate::infra::process::{ProcessRunner, ScriptKind};

/// Outcome of running a hook directory
#[derive(Debug, Clone, Default)]
pub struct HookReport {
    /// Scripts that exited with status 0
    pub succeeded: Vec<PathBuf>,
    /// Scripts that failed to run or exited non-zero
    pub failed: Vec<PathBuf>,
}

impl HookReport {
    /// Number of scripts run
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Supported scripts directly inside `dir`, sorted by path
pub fn discover_scripts(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut scripts: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && ScriptKind::detect(path).is_some())
        .collect();
    scripts.sort();
    scripts
}

/// Run every script of the hook directory `dir`
///
/// A regular file at `dir` is deleted. Script failures are logged and do not
/// stop the remaining scripts.
pub async fn run_hook_dir(runner: &ProcessRunner, dir: &Path, stage: &str) -> HookReport {
    let mut report = HookReport::default();

    match filesystem::clear_non_dir(dir, stage) {
        Ok(true) => {}
        Ok(false) => return report,
        Err(e) => {
            tracing::error!("{e}");
            return report;
        }
    }

    let scripts = discover_scripts(dir);
    if scripts.is_empty() {
        tracing::info!("No supported scripts found in {stage}.");
        return report;
    }

    tracing::info!("Executing {} {stage} scripts:", scripts.len());
    let names: Vec<String> = scripts
        .iter()
        .map(|s| s.file_name().unwrap_or_default().to_string_lossy().into_owned())
        .collect();
    print_list_tree(&names);

    let mut progress = Progress::new(scripts.len());
    for script in scripts {
        progress.advance();
        tracing::info!("{progress} {}", script.display());
        match runner.run_script(&script).await {
            Ok(Some(output)) if output.success() => {
                tracing::info!("Successfully executed script: {}", script.display());
                report.succeeded.push(script);
            }
            Ok(Some(output)) => {
                tracing::warn!("{} exited with non-zero code: {}", script.display(), output.code);
                report.failed.push(script);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!("Failed to execute script {}: {e}", script.display());
                report.failed.push(script);
            }
        }
    }

    if report.failed.is_empty() {
        tracing::info!("All {stage} scripts executed successfully.");
    } else if report.succeeded.is_empty() {
        tracing::error!("All {stage} scripts failed.");
    } else {
        tracing::warn!("{}/{} {stage} scripts failed.", report.failed.len(), report.total());
    }
    report
}
