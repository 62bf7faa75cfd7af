use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Path to the search input (will over-write the config file)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Path to the output directory
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Number of worker threads (will over-write the config file)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Emit logs as bunyan-style JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Show a progress bar while searching
    #[arg(short, long)]
    pub progress: bool,
}
