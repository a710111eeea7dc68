//! Doctor command logic
//!
//! Checks the interpreters the boot sequence shells out to, the ComfyUI
//! installation and the boot config, and reports issues with suggestions.

use std::path::Path;

use crate::config::Settings;
use crate::core::boot_config::{compile_pattern, discover_toml_files};
use crate::core::launcher::has_entry_point;

/// Result of a single dependency check
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Name of the dependency being checked
    pub name: String,
    /// Whether the check passed
    pub passed: bool,
    /// Version or location if available
    pub version: Option<String>,
    /// Error message if check failed
    pub error: Option<String>,
    /// Suggestion for fixing the issue
    pub suggestion: Option<String>,
    /// Whether this is a required or optional dependency
    pub required: bool,
}

impl CheckResult {
    /// Create a passing check result
    pub fn pass(name: &str, version: Option<String>, required: bool) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            version,
            error: None,
            suggestion: None,
            required,
        }
    }

    /// Create a failing check result
    pub fn fail(name: &str, error: &str, suggestion: Option<&str>, required: bool) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            version: None,
            error: Some(error.to_string()),
            suggestion: suggestion.map(String::from),
            required,
        }
    }
}

/// Overall doctor report
#[derive(Debug, Default)]
pub struct DoctorReport {
    /// Individual check results
    pub checks: Vec<CheckResult>,
    /// Configuration issues found
    pub config_issues: Vec<String>,
}

impl DoctorReport {
    /// Create a new empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a check result
    pub fn add_check(&mut self, result: CheckResult) {
        self.checks.push(result);
    }

    /// Add a configuration issue
    pub fn add_config_issue(&mut self, issue: String) {
        self.config_issues.push(issue);
    }

    /// Check if all required checks passed
    pub fn all_required_passed(&self) -> bool {
        self.checks.iter().filter(|c| c.required).all(|c| c.passed)
    }

    /// Check if all checks passed (including optional)
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed) && self.config_issues.is_empty()
    }

    /// Count passed checks
    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    /// Count failed checks
    pub fn failed_count(&self) -> usize {
        self.checks.iter().filter(|c| !c.passed).count()
    }

    /// Get all failed required checks
    pub fn failed_required(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|c| c.required && !c.passed).collect()
    }
}

/// Version of `command` if it resolves on `PATH` and runs
pub fn check_command_available(command: &str) -> Option<String> {
    let program = which::which(command).ok()?;
    let output = std::process::Command::new(&program)
        .arg("--version")
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    extract_version(&format!("{stdout}{stderr}"))
}

/// Extract version string from command output
fn extract_version(output: &str) -> Option<String> {
    let version_regex = regex::Regex::new(r"v?(\d+\.\d+(?:\.\d+)?(?:-\w+)?)").ok()?;
    version_regex
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Check the Python interpreter used for ComfyUI and hooks
pub fn check_python(python: &str) -> CheckResult {
    match check_command_available(python) {
        Some(version) => CheckResult::pass("Python", Some(version), true),
        None => CheckResult::fail(
            "Python",
            &format!("'{python}' not found in PATH"),
            Some("Install Python 3 or point PYTHON_BIN at the interpreter"),
            true,
        ),
    }
}

/// Check bash, needed for `.sh` hook scripts
pub fn check_bash() -> CheckResult {
    match check_command_available("bash") {
        Some(version) => CheckResult::pass("bash", Some(version), true),
        None => CheckResult::fail(
            "bash",
            "bash not found in PATH",
            Some("Install bash to run .sh hook scripts"),
            true,
        ),
    }
}

/// Check the ComfyUI installation
pub fn check_comfyui(path: &Path) -> CheckResult {
    if !path.is_dir() {
        return CheckResult::fail(
            "ComfyUI",
            &format!("{} is not a directory", path.display()),
            Some("Set COMFYUI_PATH or WORKDIR to the ComfyUI installation"),
            true,
        );
    }
    if !has_entry_point(path) {
        return CheckResult::fail(
            "ComfyUI",
            &format!("main.py not found in {}", path.display()),
            Some("Make sure COMFYUI_PATH points at a ComfyUI checkout"),
            true,
        );
    }
    CheckResult::pass("ComfyUI", Some(path.display().to_string()), true)
}

/// Check the node manager CLI, required only when nodes are synchronized
pub fn check_manager_cli(script: &Path, required: bool) -> CheckResult {
    if script.is_file() {
        CheckResult::pass("ComfyUI-Manager CLI", Some(script.display().to_string()), required)
    } else {
        CheckResult::fail(
            "ComfyUI-Manager CLI",
            &format!("{} not found", script.display()),
            Some("Install ComfyUI-Manager or set COMFYUI_MN_PATH"),
            required,
        )
    }
}

/// Problems in the boot config directory and filters
pub fn check_boot_config(settings: &Settings) -> Vec<String> {
    let mut issues = Vec::new();

    for (var, pattern) in [
        ("BOOT_CONFIG_INCLUDE", settings.config_include.as_deref()),
        ("BOOT_CONFIG_EXCLUDE", settings.config_exclude.as_deref()),
    ] {
        if let Err(e) = compile_pattern(pattern) {
            issues.push(format!("{var}: {e}"));
        }
    }

    let dir = settings.config_dir();
    if dir.is_file() {
        issues.push(format!("{} is a file, expected a directory", dir.display()));
        return issues;
    }
    for file in discover_toml_files(&dir) {
        match std::fs::read_to_string(&file) {
            Ok(content) => {
                if let Err(e) = content.parse::<toml::Table>() {
                    issues.push(format!("Invalid TOML in {}: {}", file.display(), e.message()));
                }
            }
            Err(e) => issues.push(format!("Cannot read {}: {e}", file.display())),
        }
    }

    for token in settings.token_warnings() {
        issues.push(token);
    }
    issues
}

/// Run all doctor checks
pub fn run_doctor(settings: &Settings) -> DoctorReport {
    let mut report = DoctorReport::new();

    report.add_check(check_python(&settings.python));
    report.add_check(check_bash());
    report.add_check(check_comfyui(&settings.comfyui_path));
    report.add_check(check_manager_cli(&settings.manager_cli(), settings.init_node));

    for issue in check_boot_config(settings) {
        report.add_config_issue(issue);
    }

    report
}
