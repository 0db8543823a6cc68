//! Quick-look CLI Binary
//!
//! Command-line interface for the quick-look orchestration layer.

use clap::Parser;
use quicklook::logging::init_logging;
use quicklook::tooling::cli::{Cli, CliContext};
use std::process;

fn main() {
    let cli = Cli::parse();

    // Create CLI context
    let context = match CliContext::new(cli.config.clone()) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            process::exit(1);
        }
    };

    let logging = cli.logging_config(&context.config().logging);
    if let Err(e) = init_logging(Some(&logging)) {
        eprintln!("Error initializing logging: {}", e);
        process::exit(1);
    }

    // Execute command
    match context.execute(&cli.command) {
        Ok(output) => {
            println!("{}", output);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
