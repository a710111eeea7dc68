//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod doctor;
pub mod plan;
pub mod run;
pub mod sync;

use anyhow::Result;
use clap::Subcommand;

use crate::config::defaults::{DEFAULT_LISTEN, DEFAULT_PORT};
use crate::config::Settings;

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Synchronize nodes and models, run hooks, then launch ComfyUI
    Run {
        /// Address(es) ComfyUI listens on
        #[arg(long, default_value = DEFAULT_LISTEN)]
        listen: String,

        /// Port ComfyUI listens on
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },

    /// Synchronize nodes and models and run hooks without launching
    Sync,

    /// Show what the next boot would install, move, download and remove
    Plan,

    /// Check system dependencies and the ComfyUI installation
    Doctor,
}

impl Default for Commands {
    fn default() -> Self {
        Self::Run {
            listen: DEFAULT_LISTEN.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Commands {
    /// Execute the command, returning the process exit code
    pub async fn run(self, settings: &Settings) -> Result<i32> {
        match self {
            Self::Run { listen, port } => run::execute(settings, &listen, port).await,
            Self::Sync => sync::execute(settings).await.map(|()| 0),
            Self::Plan => plan::execute(settings).await.map(|()| 0),
            Self::Doctor => doctor::execute(settings).await.map(|()| 0),
        }
    }
}
