//! ownersync — reconcile Azure DevOps groups and reviewer policies with
//! checked-in ownership files.
//!
//! # Usage
//!
//! ```text
//! ownersync groups     --spec CODEGROUPS.json [--kind team|group]
//!                      [--mode additive|full-sync] [--dry-run] [--json]
//! ownersync codeowners --spec CODEOWNERS.json --repo <name|id> [--branch main]
//!                      [--kind team|group] [--dry-run] [--json]
//! ownersync group create <name>
//! ownersync group remove-member <name> <email>
//! ```
//!
//! Connection settings come from `--org` / `--project` / `--token` or the
//! `OWNERSYNC_ORG`, `OWNERSYNC_PROJECT` and `OWNERSYNC_TOKEN` variables
//! (`AZURE_DEVOPS_EXT_PAT` is accepted for the token).

mod commands;

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    codeowners::CodeownersArgs, group::GroupCommand, groups::GroupsArgs, GlobalArgs,
};
use ownersync_core::{ResourceKind, SyncMode};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "ownersync",
    version,
    about = "Reconcile Azure DevOps teams, groups and required reviewers with ownership files",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Converge teams or security groups and their members to a CODEGROUPS file.
    Groups(GroupsArgs),

    /// Converge required-reviewer branch policies to a CODEOWNERS file.
    Codeowners(CodeownersArgs),

    /// Operate on a single group by exact display name.
    Group {
        #[command(subcommand)]
        command: GroupCommand,
    },
}

// ---------------------------------------------------------------------------
// Shared enum arguments — parsed from CLI strings, convert to core types
// ---------------------------------------------------------------------------

/// Thin wrapper so clap can parse `ResourceKind` from CLI args.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceKindArg(pub ResourceKind);

impl FromStr for ResourceKindArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "team" | "teams" => Ok(Self(ResourceKind::Team)),
            "group" | "security-group" => Ok(Self(ResourceKind::SecurityGroup)),
            other => Err(format!(
                "unknown resource kind '{other}'; expected: team, group"
            )),
        }
    }
}

impl fmt::Display for ResourceKindArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<ResourceKindArg> for ResourceKind {
    fn from(k: ResourceKindArg) -> Self {
        k.0
    }
}

/// Thin wrapper so clap can parse `SyncMode` from CLI args.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncModeArg(pub SyncMode);

impl FromStr for SyncModeArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "additive" => Ok(Self(SyncMode::Additive)),
            "full-sync" | "full" => Ok(Self(SyncMode::FullSync)),
            other => Err(format!(
                "unknown sync mode '{other}'; expected: additive, full-sync"
            )),
        }
    }
}

impl fmt::Display for SyncModeArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<SyncModeArg> for SyncMode {
    fn from(m: SyncModeArg) -> Self {
        m.0
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);
    match cli.command {
        Commands::Groups(args) => args.run(&cli.global),
        Commands::Codeowners(args) => args.run(&cli.global),
        Commands::Group { command } => commands::group::run(command, &cli.global),
    }
}

/// Log to stderr so `--json` output on stdout stays parseable.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
