//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// AD Labeler - Label platform assets from directory OUs and groups
#[derive(Parser, Debug)]
#[command(name = "ad-labeler")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, env = "AD_LABELER_CONFIG", default_value = "config.yml")]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// The command to run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Apply every rule's labels to the matching assets
    ///
    /// Examples:
    ///   ad-labeler sync                       # Use ./config.yml
    ///   ad-labeler sync --dry-run             # Show what would change
    ///   ad-labeler -c prod.yml sync -u admin -p
    Sync(SyncArgs),

    /// Check the configuration and list the rules it defines
    Validate,
}

/// Options for `sync`
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncArgs {
    /// Platform management URL (overrides the configuration)
    #[arg(long, visible_alias = "gc-management-url")]
    pub management_url: Option<String>,

    /// Platform username (overrides the configuration)
    #[arg(short, long)]
    pub user: Option<String>,

    /// Prompt for the platform password
    #[arg(short, long)]
    pub password: bool,

    /// Compute label changes without applying them
    #[arg(long)]
    pub dry_run: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Maximum assets processed at once (overrides the configuration)
    #[arg(long)]
    pub concurrency: Option<usize>,
}
