//! ComfyUI-Manager CLI wrapper
//!
//! Drives `cm-cli.py` for registry installs, uninstalls, post-install setup
//! and bulk updates, and interprets its install output.

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::ProcessError;
use crate::infra::process::{CommandOutput, ProcessRunner};

/// Marker cm-cli prints before the detailed cause of a failed install
const INSTALL_ERROR_MARKER: &str = "An error occurred while installing";

/// Outcome of `cm-cli install` as reported in its output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Freshly installed
    Installed,
    /// Already present
    Skipped,
    /// Present but disabled; cm-cli re-enabled it
    Enabled,
    /// cm-cli reported an error, or the output could not be understood
    Failed(String),
}

/// Interpret the output of `cm-cli install`
///
/// The first `ERROR:` line wins; when it only announces that an error
/// occurred, the next non-empty line carries the cause. Otherwise the
/// `1/1 [RESULT] message` line decides.
pub fn parse_install_output(output: &str) -> InstallOutcome {
    let lines: Vec<&str> = output.lines().collect();
    for (index, line) in lines.iter().enumerate() {
        let Some(pos) = line.find("ERROR:") else {
            continue;
        };
        let message = line[pos + "ERROR:".len()..].trim();
        if message.is_empty() {
            continue;
        }
        if message.contains(INSTALL_ERROR_MARKER) {
            let detail = lines[index + 1..]
                .iter()
                .map(|l| l.trim())
                .find(|l| !l.is_empty());
            return InstallOutcome::Failed(detail.unwrap_or(message).to_string());
        }
        return InstallOutcome::Failed(message.to_string());
    }

    let result = Regex::new(r"1/1\s\[(?P<result>.+?)\]\s(?P<msg>.+)")
        .ok()
        .and_then(|re| re.captures(output).map(|c| c["result"].to_string()));
    match result.as_deref() {
        Some("INSTALLED") => InstallOutcome::Installed,
        Some("SKIP") => InstallOutcome::Skipped,
        Some("ENABLED") => InstallOutcome::Enabled,
        _ => InstallOutcome::Failed("Failed to parse installation result".to_string()),
    }
}

/// Runs `cm-cli.py` commands through the configured Python
#[derive(Debug, Clone)]
pub struct ManagerCli {
    runner: ProcessRunner,
    script: PathBuf,
}

impl ManagerCli {
    /// Create a wrapper around the CLI script at `script`
    pub fn new(runner: ProcessRunner, script: PathBuf) -> Self {
        Self { runner, script }
    }

    /// Underlying process runner
    pub fn runner(&self) -> &ProcessRunner {
        &self.runner
    }

    fn args(&self, command: &str, rest: &[String]) -> Vec<String> {
        let mut args = vec![self.script.display().to_string(), command.to_string()];
        args.extend(rest.iter().cloned());
        args
    }

    async fn exec(&self, command: &str, rest: &[String]) -> Result<CommandOutput, ProcessError> {
        let args = self.args(command, rest);
        self.runner.run_checked(self.runner.python(), &args, None).await
    }

    /// `cm-cli install <node_id>@<version>`
    pub async fn install(&self, node_id: &str, version: &str) -> Result<InstallOutcome, ProcessError> {
        let output = self.exec("install", &[format!("{node_id}@{version}")]).await?;
        Ok(parse_install_output(&output.output))
    }

    /// `cm-cli uninstall <node_id>`
    pub async fn uninstall(&self, node_id: &str) -> Result<(), ProcessError> {
        self.exec("uninstall", &[node_id.to_string()]).await.map(|_| ())
    }

    /// `cm-cli post-install <path>`
    pub async fn post_install(&self, node_path: &Path) -> Result<(), ProcessError> {
        self.exec("post-install", &[node_path.display().to_string()])
            .await
            .map(|_| ())
    }

    /// `cm-cli update all`
    ///
    /// Only a failure to run the script is an error; its exit status is not
    /// checked.
    pub async fn update_all(&self) -> Result<(), ProcessError> {
        let args = self.args("update", &["all".to_string()]);
        let output = self.runner.run(self.runner.python(), &args, None).await?;
        if !output.success() {
            tracing::debug!("cm-cli update all exited with code {}", output.code);
        }
        Ok(())
    }
}
