//! Comfyboot - ComfyUI container boot orchestrator
//!
//! Brings a ComfyUI installation in line with a declarative TOML boot config
//! at container start: custom nodes are installed or removed, model files are
//! downloaded, moved or deleted, lifecycle hooks run, and ComfyUI is launched.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Boot sequence, synchronizers and planning
//! - [`infra`] - Infrastructure layer (network, filesystem, git, processes)
//! - [`config`] - Settings and constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
