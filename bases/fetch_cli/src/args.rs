// bases/fetch_cli/src/args.rs
use clap::Parser;
use std::path::PathBuf;

/// Download a tagged audio track, or a playlist as a zip archive
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// URL to download from
    pub url: String,

    /// Directory to store finished files
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Treat the URL as a playlist and produce a zip archive
    #[arg(short, long)]
    pub playlist: bool,

    /// Override the embedded title
    #[arg(long)]
    pub title: Option<String>,

    /// Override the embedded artist
    #[arg(long)]
    pub artist: Option<String>,

    /// Override the embedded album
    #[arg(long)]
    pub album: Option<String>,

    /// Directory holding bundled tool binaries
    #[arg(long, default_value = "bin")]
    pub bin_dir: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}
