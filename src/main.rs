//! Comfyboot - ComfyUI container boot orchestrator
//!
//! Entry point for the comfyboot command-line application.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use comfyboot::cli::output::{display_error, OutputConfig};
use comfyboot::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Apply output configuration globally
    let output_config = OutputConfig::new(cli.quiet, cli.json, cli.verbose);
    output_config.apply_global();

    // RUST_LOG wins over LOG_LEVEL and the -v/-q flags
    let settings = cli.settings();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(output_config.log_filter(&settings.log_level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            display_error(&e);
            std::process::exit(1);
        }
    }
}
