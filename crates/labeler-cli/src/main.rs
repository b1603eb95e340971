//! AD Labeler CLI
//!
//! Applies labels to platform assets based on directory OU and group
//! membership.

mod cli;
mod commands;
mod error;
mod logging;

use clap::Parser;
use colored::Colorize;

use cli::{Cli, Commands};
use error::Result;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Some(Commands::Sync(args)) => commands::run_sync(&cli.config, args).await,
        Some(Commands::Validate) => commands::run_validate(&cli.config).map(|()| 0),
        None => {
            println!("{} Directory-driven asset labeling", "ad-labeler".green().bold());
            println!();
            println!("Run {} for available commands.", "ad-labeler --help".cyan());
            Ok(0)
        }
    }
}
