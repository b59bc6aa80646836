//! depot - diff-and-apply installer CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use depot_cli::cmd;
use depot_cli::{Cli, Commands, load_config};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Update(args) => {
            let config = load_config(cli.config.as_deref())?;
            cmd::update::update(config, &args, cli.quiet).await
        }
        Commands::Status { root } => cmd::status::status(&root).await,
        Commands::Verify { root } => cmd::verify::verify(&root).await,
    }
}
