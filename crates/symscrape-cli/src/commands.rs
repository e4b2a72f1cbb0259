use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "symscrape")]
#[command(about = "Collect Breakpad symbols for system libraries", long_about = None)]
pub struct Cli {
    /// Narrate every file processed and show dump_syms errors
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Dump symbols for system binaries into a zip archive
    Gather(GatherArgs),
    /// Upload a previously gathered archive
    Upload {
        archive: PathBuf,
    },
    /// Zip up local symbol files changed since the last run and upload them
    Repack {
        /// Build the archive but don't upload it or record the run
        #[arg(long)]
        dry_run: bool,
    },
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Args)]
pub struct GatherArgs {
    /// Gather all symbols, not only missing ones
    #[arg(short, long)]
    pub all: bool,

    /// Show a progress bar
    #[arg(long)]
    pub progress: bool,

    /// Upload the archive when done
    #[arg(long)]
    pub upload: bool,

    /// Archive to write, overriding the configured output path
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Path to the dump_syms binary
    pub dump_syms: PathBuf,

    /// Files or directories to process instead of the system directories.
    /// Implies --all.
    pub files: Vec<PathBuf>,
}
