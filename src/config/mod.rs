//! Configuration and constants
//!
//! - [`defaults`] - Default values and fixed paths
//! - [`urls`] - Upstream and mirror endpoints
//! - [`settings`] - Runtime settings resolved from the environment

pub mod defaults;
pub mod settings;
pub mod urls;

pub use settings::Settings;
