//! CLI module for the intelligent cache
//!
//! Provides subcommands:
//! - `run`: restore the snapshot, run background jobs until Ctrl-C
//! - `inspect`: list the records of a snapshot file

pub mod inspect;
pub mod run;

use clap::{Parser, Subcommand};

/// Intelligent cache - similarity matching, priority eviction and durable snapshots
#[derive(Parser)]
#[command(name = "intelli-cache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the cache with its sweep and snapshot jobs
    Run(run::RunArgs),

    /// Show the contents of a snapshot file
    Inspect(inspect::InspectArgs),
}
