//! `ownersync groups` — converge teams / security groups to a CODEGROUPS file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use ownersync_core::spec::load_group_spec;
use ownersync_platform::RetryConfig;
use ownersync_reconcile::{pipeline, GroupAction, GroupReport, GroupSyncOptions};

use super::{dry_run_prefix, print_json, GlobalArgs};
use crate::{ResourceKindArg, SyncModeArg};

/// Arguments for `ownersync groups`.
#[derive(Args, Debug)]
pub struct GroupsArgs {
    /// Path to the CODEGROUPS file (JSON, or YAML by extension).
    #[arg(long, value_name = "FILE")]
    pub spec: PathBuf,

    /// Resource kind to reconcile: team | group.
    #[arg(long, default_value = "team")]
    pub kind: ResourceKindArg,

    /// additive leaves unlisted members alone; full-sync removes them.
    #[arg(long, default_value = "additive")]
    pub mode: SyncModeArg,

    /// How many times to re-list before a newly created group must be visible.
    #[arg(long, default_value_t = 6)]
    pub visibility_retries: u32,

    /// Show the planned changes without applying them.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit the report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl GroupsArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let spec = load_group_spec(&self.spec)
            .with_context(|| format!("failed to load group spec '{}'", self.spec.display()))?;
        tracing::info!("loaded {} groups from {}", spec.len(), self.spec.display());

        let client = global.client()?;
        let defaults = GroupSyncOptions::default();
        let options = GroupSyncOptions {
            kind: self.kind.into(),
            mode: self.mode.into(),
            naming: global.naming(),
            dry_run: self.dry_run,
            visibility: RetryConfig {
                max_retries: self.visibility_retries,
                ..defaults.visibility
            },
        };

        let report = pipeline::sync_groups(&client, &spec, &options)
            .with_context(|| format!("{} reconciliation failed", options.kind))?;
        if self.json {
            return print_json(&report);
        }
        print_report(&report);
        Ok(())
    }
}

#[derive(Tabled)]
struct ActionRow {
    #[tabled(rename = "action")]
    action: String,
    #[tabled(rename = "group")]
    group: String,
    #[tabled(rename = "member")]
    member: String,
}

fn print_report(report: &GroupReport) {
    let prefix = dry_run_prefix(report.dry_run);
    if report.is_noop() {
        println!("{prefix}{} {}s up to date ({})", "✓".green(), report.kind, report.mode);
        return;
    }

    println!(
        "{prefix}{} {} created, {} added, {} removed ({})",
        "✓".green(),
        report.created(),
        report.added(),
        report.removed(),
        report.mode,
    );
    let rows: Vec<ActionRow> = report.actions.iter().map(row).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn row(action: &GroupAction) -> ActionRow {
    match action {
        GroupAction::CreateGroup { group } => ActionRow {
            action: "create".green().to_string(),
            group: group.clone(),
            member: String::new(),
        },
        GroupAction::AddMember {
            group, reference, ..
        } => ActionRow {
            action: "add".green().to_string(),
            group: group.clone(),
            member: reference.to_string(),
        },
        GroupAction::RemoveMember { group, member } => ActionRow {
            action: "remove".red().to_string(),
            group: group.clone(),
            member: member.to_string(),
        },
    }
}
