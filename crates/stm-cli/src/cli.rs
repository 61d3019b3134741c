use std::path::PathBuf;

use clap::Parser;

/// Command line of the `stix2misp` binary.
#[derive(Debug, Parser)]
#[command(
    name = "stix2misp",
    version,
    about = "Convert a STIX 2.0 bundle into a MISP event"
)]
pub struct Cli {
    /// STIX 2.0 bundle (JSON)
    pub input: PathBuf,

    /// Output path (defaults to the input path plus the configured suffix)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Write the run report (counts, skips, unmapped keys) as JSON here
    #[arg(short, long)]
    pub report: Option<PathBuf>,

    /// Extra TOML configuration layered above the discovered files
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Quiet mode (errors only on stderr)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Verbose mode (debug logging on stderr)
    #[arg(short, long)]
    pub verbose: bool,
}
