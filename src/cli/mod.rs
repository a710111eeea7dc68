//! Command-line interface module
//!
//! This module handles argument parsing and output formatting.
//! It contains no business logic - that belongs in the [`crate::core`] module.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::config::Settings;
use commands::Commands;

/// Comfyboot - ComfyUI container boot orchestrator
///
/// Synchronizes custom nodes and models from TOML boot config, runs hook
/// scripts, then launches ComfyUI.
#[derive(Parser, Debug)]
#[command(name = "comfyboot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format for scripting (plan, doctor)
    #[arg(long, global = true)]
    pub json: bool,

    /// Working directory holding ComfyUI, boot config, scripts and state
    #[arg(long, env = "WORKDIR", global = true)]
    pub workdir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Resolve settings from the environment, with `--workdir` taking
    /// precedence over `WORKDIR`
    pub fn settings(&self) -> Settings {
        let workdir = self.workdir.as_ref().map(|dir| dir.display().to_string());
        Settings::from_lookup(|key| match (key, &workdir) {
            ("WORKDIR", Some(dir)) => Some(dir.clone()),
            _ => std::env::var(key).ok(),
        })
    }

    /// Execute the CLI command, returning the process exit code
    ///
    /// Without a subcommand the full boot sequence runs.
    pub async fn run(self) -> Result<i32> {
        let settings = self.settings();
        self.command
            .unwrap_or_default()
            .run(&settings)
            .await
    }
}
