//! qspif - SFDP-driven QSPI flash tool
//!
//! Decodes the Serial Flash Discoverable Parameters of a NOR flash chip and
//! shows how the `qspif-core` block device would drive it:
//!
//! - `inspect` prints the parsed tables, erase types and address regions
//! - `plan-erase` prints the erase instructions a range splits into
//! - `simulate` runs init, erase, program and verify against an emulated
//!   chip built from the same SFDP image

mod cli;
mod commands;
mod error;

use clap::Parser;
use cli::{Cli, Commands};

fn main() {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let result = match cli.command {
        Commands::Inspect { image } => commands::run_inspect(&image),
        Commands::PlanErase {
            image,
            start,
            length,
        } => commands::run_plan_erase(&image, start, length),
        Commands::Simulate {
            image,
            config,
            start,
            length,
            register,
        } => commands::run_simulate(&image, config.as_deref(), start, length, &register),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
