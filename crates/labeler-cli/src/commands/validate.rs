//! Validate command implementation

use std::path::Path;

use colored::Colorize;
use labeler_core::Manifest;

use crate::error::Result;

/// Run the validate command
///
/// Loads the configuration, checks every rule and prints what each one
/// targets. Nothing is contacted over the network.
pub fn run_validate(config: &Path) -> Result<()> {
    println!(
        "{} Validating {}",
        "=>".blue().bold(),
        config.display().to_string().cyan()
    );

    let manifest = Manifest::load(config)?;
    let rules = manifest.rule_set()?;

    if rules.is_empty() {
        println!("   {} No rules defined", "!".yellow());
    }
    for rule in rules.rules() {
        let domain = manifest.domain_for(&rule.scope).unwrap_or("-");
        println!(
            "   {} {} {} [{}]",
            "+".green(),
            rule.name.cyan(),
            rule.scope,
            domain.dimmed()
        );
        for (key, value) in &rule.labels {
            println!("       {}: {}", key, value);
        }
    }

    println!(
        "{} Configuration is valid ({} rules, {} domains)",
        "OK".green().bold(),
        rules.len(),
        manifest.domains.len()
    );
    Ok(())
}
