//! rant command-line application
//!
//! Fetches pinned speech models and prints the verified local path that an
//! inference engine can load.

mod cli;
mod commands;
mod progress;

use anyhow::Result;
use clap::Parser;
use rant_models::{HubConfig, ModelManager};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays scriptable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let manager = build_manager(&cli)?;

    match cli.command {
        Command::List => commands::list(&manager).await,
        Command::Fetch(arg) => {
            let descriptor = commands::resolve_descriptor(&arg.model)?;
            commands::fetch(&manager, &descriptor).await
        }
        Command::Status(arg) => {
            let descriptor = commands::resolve_descriptor(&arg.model)?;
            commands::status(&manager, &descriptor).await
        }
        Command::Verify(arg) => {
            let descriptor = commands::resolve_descriptor(&arg.model)?;
            commands::verify(&manager, &descriptor).await
        }
        Command::Path(arg) => {
            let descriptor = commands::resolve_descriptor(&arg.model)?;
            commands::path(&manager, &descriptor).await
        }
        Command::Remove(arg) => {
            let descriptor = commands::resolve_descriptor(&arg.model)?;
            commands::remove(&manager, &descriptor).await
        }
        Command::Clear => commands::clear(&manager).await,
        Command::Manifest { dir } => commands::manifest(&manager, &dir).await,
    }
}

fn build_manager(cli: &Cli) -> Result<ModelManager> {
    let hub = match &cli.hub_url {
        Some(url) => HubConfig::with_base_url(url.as_str()),
        None => HubConfig::default(),
    };

    let manager = match &cli.cache_dir {
        Some(dir) => ModelManager::with_config(dir.clone(), hub),
        None => {
            let default = ModelManager::new()?;
            ModelManager::with_config(default.cache_directory().to_path_buf(), hub)
        }
    };
    Ok(manager)
}
