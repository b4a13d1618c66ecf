mod app;
mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use imagefetch::config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Fetch(args) => app::fetch(config, args).await?,
        Commands::Interactive(args) => app::interactive(config, args).await?,
        Commands::Extract(args) => app::extract_only(args).await?,
    }

    Ok(())
}
