//! `ownersync group create <name>` and `ownersync group remove-member <name> <email>`

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;

use ownersync_core::{IdentityRef, ResourceKind};
use ownersync_reconcile::{
    groups::{self, EnsureOutcome, RemoveOutcome},
    pipeline,
};

use super::{dry_run_prefix, GlobalArgs};
use crate::ResourceKindArg;

/// Single-group operations. Names are exact display names; no prefix or
/// suffix is applied.
#[derive(Subcommand, Debug)]
pub enum GroupCommand {
    /// Create a group unless one with this name already exists.
    Create(CreateArgs),

    /// Remove one user from a group.
    RemoveMember(RemoveMemberArgs),
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Display name of the group.
    pub name: String,

    /// Resource kind: team | group.
    #[arg(long, default_value = "group")]
    pub kind: ResourceKindArg,

    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct RemoveMemberArgs {
    /// Display name of the group.
    pub name: String,

    /// Email of the user to remove.
    pub email: String,

    /// Resource kind: team | group.
    #[arg(long, default_value = "group")]
    pub kind: ResourceKindArg,

    #[arg(long)]
    pub dry_run: bool,
}

pub fn run(cmd: GroupCommand, global: &GlobalArgs) -> Result<()> {
    match cmd {
        GroupCommand::Create(args) => create(args, global),
        GroupCommand::RemoveMember(args) => remove_member(args, global),
    }
}

fn create(args: CreateArgs, global: &GlobalArgs) -> Result<()> {
    let client = global.client()?;
    let kind: ResourceKind = args.kind.into();
    let prefix = dry_run_prefix(args.dry_run);

    let outcome = groups::ensure_group(&client, kind, &args.name, args.dry_run)
        .with_context(|| format!("failed to create {kind} '{}'", args.name))?;
    match outcome {
        EnsureOutcome::Created => {
            println!("{prefix}{} created {kind} '{}'", "✓".green(), args.name)
        }
        EnsureOutcome::AlreadyExists => println!("{kind} '{}' already exists", args.name),
    }
    Ok(())
}

fn remove_member(args: RemoveMemberArgs, global: &GlobalArgs) -> Result<()> {
    let member = IdentityRef::from(args.email.trim());
    if member.as_str().is_empty() || member.is_group() {
        anyhow::bail!("expected a user email, got '{}'", args.email);
    }
    let client = global.client()?;
    let kind: ResourceKind = args.kind.into();
    let prefix = dry_run_prefix(args.dry_run);

    let outcome = pipeline::remove_group_member(&client, kind, &args.name, &member, args.dry_run)
        .with_context(|| format!("failed to remove {member} from '{}'", args.name))?;
    match outcome {
        RemoveOutcome::Removed => {
            println!("{prefix}{} removed {member} from '{}'", "✓".green(), args.name)
        }
        RemoveOutcome::NotMember => println!("{member} is not a member of '{}'", args.name),
        RemoveOutcome::GroupMissing => println!("{kind} '{}' does not exist", args.name),
    }
    Ok(())
}
