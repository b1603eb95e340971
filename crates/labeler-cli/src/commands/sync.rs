//! Sync command implementation

use std::path::Path;

use colored::Colorize;
use dialoguer::Password;
use labeler_centra::{CentraClient, CentraConfig, CentraLabelStore};
use labeler_core::{Manifest, OutcomeKind, SyncDriver, SyncSummary};
use labeler_ldap::LdapDirectory;
use tracing::{info, warn};

use crate::cli::SyncArgs;
use crate::error::Result;

/// Exit status when the run finished but some assets failed
pub const EXIT_PARTIAL_FAILURE: i32 = 2;

/// Run the sync command and return the process exit status
///
/// Configuration and rules are checked before any connection is opened.
pub async fn run_sync(config: &Path, args: SyncArgs) -> Result<i32> {
    let manifest = Manifest::load(config)?;
    let rules = manifest.rule_set()?;
    if rules.is_empty() {
        warn!(config = %config.display(), "No rules defined, nothing to sync");
        let mut summary = SyncSummary::new(args.dry_run);
        summary.finish();
        return report(&summary, args.json);
    }

    let password = if args.password {
        Some(Password::new().with_prompt("Password").interact()?)
    } else {
        None
    };
    let manifest = manifest.with_platform_overrides(args.management_url, args.user, password);

    let mut options = manifest.sync_options();
    options.dry_run = args.dry_run;
    if let Some(concurrency) = args.concurrency {
        options.concurrency = concurrency.max(1);
    }

    let client = CentraClient::new(CentraConfig::from_section(&manifest.guardicore)?)?;
    client.authenticate().await?;
    let directory = LdapDirectory::connect(&manifest.domains).await?;

    let driver = SyncDriver::new(directory, CentraLabelStore::new(client), options);
    let result = driver.run(&rules).await;

    let (directory, _) = driver.into_parts();
    directory.close().await;
    let summary = result?;
    info!(run_id = %summary.run_id, "Run complete");

    report(&summary, args.json)
}

fn report(summary: &SyncSummary, json: bool) -> Result<i32> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        print_summary(summary);
    }
    Ok(exit_code(summary))
}

/// 0 when nothing failed, [`EXIT_PARTIAL_FAILURE`] otherwise
pub fn exit_code(summary: &SyncSummary) -> i32 {
    if summary.is_success() {
        0
    } else {
        EXIT_PARTIAL_FAILURE
    }
}

fn print_summary(summary: &SyncSummary) {
    let title = if summary.dry_run {
        "Label sync (dry run)"
    } else {
        "Label sync"
    };
    println!("{} {} {}", "=>".blue().bold(), title, summary.run_id.to_string().dimmed());

    for rule in &summary.rules {
        if rule.scope_missing {
            println!(
                "   {} {} {}: scope not found",
                "?".yellow(),
                rule.rule.cyan(),
                rule.scope
            );
        } else {
            println!(
                "   {} {} {}: {} matched",
                "-".blue(),
                rule.rule.cyan(),
                rule.scope,
                rule.matched
            );
        }
    }

    let verb = if summary.dry_run { "would apply" } else { "applied" };
    for outcome in summary.outcomes_of(OutcomeKind::Applied) {
        let labels: Vec<String> = outcome
            .labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        println!(
            "   {} {} {} {}",
            "+".green(),
            outcome.object.name.cyan(),
            verb,
            labels.join(", ")
        );
    }
    for outcome in summary.outcomes_of(OutcomeKind::SkippedMissing) {
        println!(
            "   {} {} has no managed asset",
            "-".yellow(),
            outcome.object.name.cyan()
        );
    }
    for outcome in summary.outcomes_of(OutcomeKind::Failed) {
        println!(
            "   {} {}: {}",
            "!".red(),
            outcome.object.name.cyan(),
            outcome.detail.as_deref().unwrap_or("failed")
        );
    }

    println!();
    let status = if summary.is_success() {
        "OK".green().bold()
    } else {
        "FAILED".red().bold()
    };
    println!(
        "{} {} applied, {} unchanged, {} missing, {} failed",
        status,
        summary.applied,
        summary.skipped_identical,
        summary.skipped_missing,
        summary.failed
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use labeler_core::{DirectoryObject, ObjectOutcome};

    fn host(name: &str) -> DirectoryObject {
        DirectoryObject::new(format!("CN={},DC=corp", name), name)
    }

    #[test]
    fn test_exit_code_reflects_failures() {
        let mut summary = SyncSummary::new(false);
        summary.record(ObjectOutcome::skipped_missing(host("a"), "no agent"));
        assert_eq!(exit_code(&summary), 0);

        summary.record(ObjectOutcome::failed(host("b"), "503"));
        assert_eq!(exit_code(&summary), EXIT_PARTIAL_FAILURE);
    }
}
