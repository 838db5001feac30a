//! Drift CLI: synchronize catalog exports with a remote search index.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use drift::{Config, init_tracing, run_all};

#[derive(Parser, Debug)]
#[command(version, about = "Catalog delta synchronization engine")]
struct CliArgs {
    /// Path to the configuration file
    #[arg(short, long, default_value = "drift.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = CliArgs::parse();

    let config = match Config::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    if !config.metrics.disabled {
        let addr = match config.metrics.address.parse() {
            Ok(addr) => addr,
            Err(e) => {
                eprintln!("Invalid metrics address '{}': {e}", config.metrics.address);
                return ExitCode::FAILURE;
            }
        };
        if let Err(e) = drift::metrics::init(addr) {
            eprintln!("Failed to start metrics server: {e}");
            return ExitCode::FAILURE;
        }
    }

    info!(
        catalogs = config.catalogs.len(),
        "Starting drift synchronization"
    );

    let outcomes = match run_all(config).await {
        Ok(outcomes) => outcomes,
        Err(e) => {
            eprintln!("Synchronization failed to start: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut failed = false;
    for outcome in outcomes {
        match outcome.result {
            Ok(report) => {
                info!(
                    catalog = %outcome.catalog,
                    processed = report.processed_records,
                    sent = report.records_sent,
                    failed = report.records_failed,
                    "Run finished"
                );
                if report.has_failures() {
                    failed = true;
                }
            }
            Err(e) => {
                error!(catalog = %outcome.catalog, "Run failed: {e}");
                failed = true;
            }
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
