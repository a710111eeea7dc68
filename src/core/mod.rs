//! Core business logic module
//!
//! Boot sequence for a ComfyUI container. Subprocess, network and disk
//! primitives live in [`crate::infra`].
//!
//! # Submodules
//!
//! - [`boot_config`] - Boot config discovery, filtering and merging
//! - [`state`] - Previous-state store
//! - [`nodes`] - Custom node synchronization
//! - [`models`] - Model file synchronization
//! - [`hooks`] - Lifecycle hook scripts
//! - [`launcher`] - Boot sequence and ComfyUI launch
//! - [`plan`] - Dry-run planning
//! - [`doctor`] - Environment checks
//! - [`url`] - URL normalization and mirror rewriting
//! - [`progress`] - Queue counters and list logging

pub mod boot_config;
pub mod doctor;
pub mod hooks;
pub mod launcher;
pub mod models;
pub mod nodes;
pub mod plan;
pub mod progress;
pub mod state;
pub mod url;
