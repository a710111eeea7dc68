//! CLI command for `comfyboot sync`

use anyhow::{Context, Result};

use crate::cli::output::{print_success, print_warning};
use crate::config::Settings;
use crate::core::launcher;

/// Execute the sync command
pub async fn execute(settings: &Settings) -> Result<()> {
    let summary = launcher::initialize(settings)
        .await
        .context("Boot initialization failed")?;

    let (_, warnings) = summary.lines();
    if warnings.is_empty() {
        print_success("Initialization complete");
    } else {
        print_warning("Initialization complete with failures, see the log above");
    }
    Ok(())
}
