//! CLI command for `comfyboot run`

use anyhow::{Context, Result};

use crate::config::Settings;
use crate::core::launcher;

/// Execute the run command
///
/// Returns ComfyUI's exit code.
pub async fn execute(settings: &Settings, listen: &str, port: u16) -> Result<i32> {
    launcher::initialize(settings)
        .await
        .context("Boot initialization failed")?;
    let code = launcher::launch(settings, listen, port)
        .await
        .context("Failed to run ComfyUI")?;
    Ok(code)
}
