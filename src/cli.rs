use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "imagefetch")]
#[command(about = "Extract image URLs from text and download them", long_about = None)]
pub struct Cli {
    /// Configuration file (overrides IMAGEFETCH_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download every image URL found in the given text
    Fetch(FetchArgs),

    /// Prompt for text repeatedly, downloading after each line
    Interactive(InteractiveArgs),

    /// List the URLs that would be downloaded, without fetching them
    Extract(InputArgs),
}

#[derive(clap::Args, Debug)]
pub struct InputArgs {
    /// Text to scan; joined with spaces. Read from stdin when empty
    pub text: Vec<String>,

    /// Read the text from a file instead
    #[arg(long, short = 'i', conflicts_with = "text")]
    pub input: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct FetchArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Destination directory
    #[arg(long, short = 'd')]
    pub dir: Option<PathBuf>,

    /// Total attempts per URL
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Print the batch result as JSON instead of the summary line
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args, Debug)]
pub struct InteractiveArgs {
    /// Destination directory
    #[arg(long, short = 'd')]
    pub dir: Option<PathBuf>,
}
