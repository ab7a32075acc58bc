use std::path::PathBuf;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Download a file over several ranged HTTP connections")]
pub struct CliArgs {
    /// URL to download
    pub url: String,

    /// Number of parallel connections
    #[arg(short = 'n', long)]
    pub connections: Option<usize>,

    /// Directory the finished file is written to
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// JSON config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory holding parts and checkpoints of unfinished downloads
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}
