mod cli;
mod commands;
mod config;
mod error;
mod logging;
mod utils;

use crate::cli::Cli;
use crate::error::{CliError, Result};
use clap::Parser;
use tracing::{debug, error, info};

fn main() {
    if let Err(e) = run_app() {
        eprintln!("\n❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn run_app() -> Result<()> {
    let cli = Cli::parse();

    std::fs::create_dir_all(&cli.directory)?;
    logging::setup_logging(cli.verbose, cli.quiet, &cli.log_path())?;

    info!(
        "🚀 qFit-ligand v{} starting up.",
        env!("CARGO_PKG_VERSION")
    );
    info!("{}", std::env::args().collect::<Vec<_>>().join(" "));
    debug!("Full CLI arguments parsed: {:?}", &cli);

    if let Some(num_threads) = cli.threads {
        if num_threads == 0 {
            return Err(CliError::Argument(
                "--threads must be at least 1".to_string(),
            ));
        }
        info!(
            "Setting Rayon global thread pool to {} threads.",
            num_threads
        );
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
            .map_err(|e| {
                CliError::Other(anyhow::anyhow!("Failed to build global thread pool: {}", e))
            })?;
    }

    let command_result = commands::fit::run(&cli);

    match &command_result {
        Ok(_) => {
            info!("✅ Command completed successfully.");
            println!("✅ Command completed successfully.");
        }
        Err(e) => {
            error!("❌ Command failed: {}", e);
        }
    }

    command_result
}
