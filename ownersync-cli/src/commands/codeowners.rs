//! `ownersync codeowners` — converge required-reviewer policies of one branch.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use ownersync_core::{spec::load_ownership_spec, IdentityId};
use ownersync_reconcile::{
    pipeline::{self, PolicySyncOptions},
    PolicyAction, PolicyReport,
};

use super::{dry_run_prefix, print_json, GlobalArgs};
use crate::ResourceKindArg;

/// Arguments for `ownersync codeowners`.
#[derive(Args, Debug)]
pub struct CodeownersArgs {
    /// Path to the CODEOWNERS file (JSON, or YAML by extension).
    #[arg(long, value_name = "FILE")]
    pub spec: PathBuf,

    /// Repository name or id.
    #[arg(long)]
    pub repo: String,

    /// Branch the policies apply to.
    #[arg(long, default_value = "main")]
    pub branch: String,

    /// What `@@` references name: team | group.
    #[arg(long, default_value = "team")]
    pub kind: ResourceKindArg,

    /// Show the planned changes without applying them.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit the report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl CodeownersArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let spec = load_ownership_spec(&self.spec)
            .with_context(|| format!("failed to load codeowners spec '{}'", self.spec.display()))?;
        tracing::info!("loaded {} paths from {}", spec.len(), self.spec.display());

        let client = global.client()?;
        let options = PolicySyncOptions {
            kind: self.kind.into(),
            naming: global.naming(),
            repository: self.repo.clone(),
            branch: self.branch.clone(),
            dry_run: self.dry_run,
        };

        let report = pipeline::sync_codeowners(&client, &spec, &options).with_context(|| {
            format!("policy reconciliation failed for '{}' on {}", self.repo, self.branch)
        })?;
        if self.json {
            return print_json(&report);
        }
        print_report(&self.repo, &self.branch, &report);
        Ok(())
    }
}

#[derive(Tabled)]
struct PolicyRow {
    #[tabled(rename = "action")]
    action: String,
    #[tabled(rename = "path")]
    path: String,
    #[tabled(rename = "reviewers")]
    reviewers: String,
}

fn print_report(repo: &str, branch: &str, report: &PolicyReport) {
    let prefix = dry_run_prefix(report.dry_run);
    if report.is_noop() {
        println!("{prefix}{} '{repo}' {branch}: reviewers up to date", "✓".green());
    } else {
        println!(
            "{prefix}{} '{repo}' {branch}: {} created, {} updated",
            "✓".green(),
            report.created(),
            report.updated(),
        );
        let rows: Vec<PolicyRow> = report.actions.iter().map(row).collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }

    for orphan in &report.orphaned {
        println!(
            "{} policy {} for '{}' is not listed in the CODEOWNERS file; left in place",
            "!".yellow().bold(),
            orphan.policy_id,
            orphan.path
        );
    }
}

fn row(action: &PolicyAction) -> PolicyRow {
    match action {
        PolicyAction::CreatePolicy { path, reviewers } => PolicyRow {
            action: "create".green().to_string(),
            path: path.clone(),
            reviewers: join(reviewers, ""),
        },
        PolicyAction::UpdatePolicy {
            path,
            policy_id,
            added,
            removed,
        } => {
            let mut changes = Vec::new();
            if !added.is_empty() {
                changes.push(join(added, "+"));
            }
            if !removed.is_empty() {
                changes.push(join(removed, "-"));
            }
            PolicyRow {
                action: format!("update #{policy_id}").yellow().to_string(),
                path: path.clone(),
                reviewers: changes.join(" "),
            }
        }
    }
}

fn join<'a>(ids: impl IntoIterator<Item = &'a IdentityId>, sign: &str) -> String {
    ids.into_iter()
        .map(|id| format!("{sign}{id}"))
        .collect::<Vec<_>>()
        .join(" ")
}
