use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Multi-source public-health indicator pipeline.
///
/// Ingests per-location time series from configured sources, repairs and
/// merges them into canonical series files, and assembles the published
/// multi-domain dataset.
#[derive(Parser, Debug)]
#[command(name = "epiwatch", about = "Public-health indicator ingestion pipeline")]
pub struct CliArgs {
    /// Path to the pipeline configuration file
    #[arg(long, default_value = "config.yaml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch, repair, and merge data from the configured sources.
    ///
    /// LOCATIONS is a list of location names, or one of the classes
    /// `all`, `batch`, `incremental`.
    Get {
        #[arg(default_value = "all")]
        locations: Vec<String>,

        /// Locations to skip (comma-separated)
        #[arg(long, short = 's', value_delimiter = ',')]
        skip: Vec<String>,

        /// Worker pool size override (1 = strictly sequential)
        #[arg(long)]
        n_jobs: Option<usize>,

        /// Start the slowest jobs first, using the previous run's timings
        #[arg(long)]
        optimize: bool,
    },

    /// Assemble the published dataset from the canonical series files.
    Generate,

    /// Print the previous run report, slowest jobs first.
    Report {
        /// Limit to one domain
        #[arg(long)]
        domain: Option<String>,
    },
}
