//! Output formatting
//!
//! Global output mode (quiet, JSON, verbosity), status-prefixed messages and
//! the log filter derived from them.

use std::sync::atomic::{AtomicBool, Ordering};

static QUIET: AtomicBool = AtomicBool::new(false);
static JSON: AtomicBool = AtomicBool::new(false);

/// Output mode selected on the command line
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Only errors
    pub quiet: bool,
    /// Machine-readable output
    pub json: bool,
    /// `-v` count
    pub verbose: u8,
}

impl OutputConfig {
    /// Create an output config
    pub fn new(quiet: bool, json: bool, verbose: u8) -> Self {
        Self {
            quiet,
            json,
            verbose,
        }
    }

    /// Make this config visible to the `print_*` helpers
    pub fn apply_global(&self) {
        QUIET.store(self.quiet, Ordering::Relaxed);
        JSON.store(self.json, Ordering::Relaxed);
    }

    /// Tracing filter directive for the configured `LOG_LEVEL`
    ///
    /// `-q` lowers the level to warn, `-v` raises it to debug and `-vv` to
    /// trace.
    pub fn log_filter(&self, log_level: &str) -> String {
        if self.quiet {
            return "warn".to_string();
        }
        match self.verbose {
            0 => normalize_level(log_level).to_string(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    }
}

/// Map a `LOG_LEVEL` value onto a tracing level name
pub fn normalize_level(level: &str) -> &'static str {
    match level.trim().to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" | "critical" | "fatal" => "error",
        _ => "info",
    }
}

/// Whether quiet mode is on
pub fn is_quiet() -> bool {
    QUIET.load(Ordering::Relaxed)
}

/// Whether JSON output is on
pub fn is_json() -> bool {
    JSON.load(Ordering::Relaxed)
}

/// Print an informational message
pub fn print_info(message: &str) {
    if !is_quiet() {
        println!("{} {message}", status::INFO);
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    if !is_quiet() {
        println!("{} {message}", status::SUCCESS);
    }
}

/// Print a warning
pub fn print_warning(message: &str) {
    if !is_quiet() {
        println!("{} {message}", status::WARNING);
    }
}

/// Print an indented detail line
pub fn print_detail(message: &str) {
    if !is_quiet() {
        println!("    {message}");
    }
}

/// Print an error and its causes to stderr
pub fn display_error(error: &anyhow::Error) {
    if is_json() {
        let causes: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
        let value = serde_json::json!({
            "status": "error",
            "error": error.to_string(),
            "causes": causes,
        });
        eprintln!("{value}");
        return;
    }
    eprintln!("{} Error: {error}", status::ERROR);
    for cause in error.chain().skip(1) {
        eprintln!("    Caused by: {cause}");
    }
}

/// Status message prefixes
pub mod status {
    /// Success prefix (green checkmark)
    pub const SUCCESS: &str = "✓";

    /// Error prefix (red X)
    pub const ERROR: &str = "✗";

    /// Warning prefix (yellow triangle)
    pub const WARNING: &str = "⚠";

    /// Info prefix (blue circle)
    pub const INFO: &str = "ℹ";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_flags() {
        assert_eq!(OutputConfig::new(false, false, 0).log_filter("WARNING"), "warn");
        assert_eq!(OutputConfig::new(false, false, 1).log_filter("INFO"), "debug");
        assert_eq!(OutputConfig::new(false, false, 2).log_filter("INFO"), "trace");
        assert_eq!(OutputConfig::new(true, false, 2).log_filter("DEBUG"), "warn");
    }

    #[test]
    fn test_normalize_level() {
        assert_eq!(normalize_level("DEBUG"), "debug");
        assert_eq!(normalize_level("CRITICAL"), "error");
        assert_eq!(normalize_level("bogus"), "info");
    }
}
