//! Command-line definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "rant", version, about = "Fetch, verify and cache pinned speech models", long_about = None)]
pub struct Cli {
    /// Cache root; defaults to the platform cache directory
    #[arg(long, global = true, env = "RANT_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Hub base URL
    #[arg(long, global = true, env = "RANT_HUB_URL")]
    pub hub_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List pinned models and their cache state
    #[command(alias = "ls")]
    List,
    /// Download and verify a model
    #[command(alias = "get")]
    Fetch(ModelArg),
    /// Show whether a model is cached and verified
    Status(ModelArg),
    /// Re-run every integrity check on a cached model
    Verify(ModelArg),
    /// Print the local path of a verified model
    Path(ModelArg),
    /// Delete one cached model
    #[command(alias = "rm")]
    Remove(ModelArg),
    /// Delete the whole model cache
    Clear,
    /// Print the manifest hash of a directory, for pinning new revisions
    Manifest {
        /// Directory to hash
        dir: PathBuf,
    },
}

#[derive(Debug, clap::Args)]
pub struct ModelArg {
    /// Pinned model id, or a path to a JSON artifact descriptor
    pub model: String,
}
