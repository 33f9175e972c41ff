//! Command-line entry point.
//!
//! ```bash
//! openapi-from-operators ./my-service -o openapi.json
//! openapi-from-operators ./my-service -f yaml --server https://api.example.com --strict
//! ```

use anyhow::Result;
use clap::Parser;
use log::info;
use openapi_from_operators::cli::{self, CliArgs};

fn main() -> Result<()> {
    let args = CliArgs::parse();

    let log_level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .parse_default_env()
        .init();

    info!("openapi-from-operators starting...");
    cli::run(&args)?;
    info!("OpenAPI document generation completed successfully");
    Ok(())
}
