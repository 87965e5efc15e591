//! Team / security-group reconciliation.
//!
//! ## `reconcile_groups` — steps
//!
//! 1. List managed groups (display names following the naming convention)
//!    and create every desired group that is missing, once each.
//! 2. Re-list until every desired group is visible, backing off between
//!    listings; give up with [`ReconcileError::GroupNotVisible`].
//! 3. For each desired group, diff resolved member ids against live members.
//! 4. Add `desired − existing`.
//! 5. In full-sync mode, also remove `existing − desired`.

use std::collections::{BTreeMap, BTreeSet};
use std::thread::sleep;
use std::time::Duration;

use serde::Serialize;

use ownersync_core::{
    GroupSpec, IdentityId, IdentityRef, IdentityRole, Naming, RemoteGroup, ResourceKind, SyncMode,
};
use ownersync_platform::{PlatformClient, RetryConfig};

use crate::diff;
use crate::error::ReconcileError;
use crate::resolver::IdentityResolver;

// ---------------------------------------------------------------------------
// Options and report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GroupSyncOptions {
    pub kind: ResourceKind,
    pub mode: SyncMode,
    pub naming: Naming,
    /// Compute and report actions without mutating anything.
    pub dry_run: bool,
    /// Backoff schedule for the post-creation re-listing.
    pub visibility: RetryConfig,
}

impl Default for GroupSyncOptions {
    fn default() -> Self {
        Self {
            kind: ResourceKind::default(),
            mode: SyncMode::default(),
            naming: Naming::default(),
            dry_run: false,
            visibility: RetryConfig {
                max_retries: 6,
                initial_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(15),
                backoff_multiplier: 2.0,
                jitter: true,
            },
        }
    }
}

/// One change applied (or planned, in dry-run mode) to a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum GroupAction {
    CreateGroup {
        group: String,
    },
    AddMember {
        group: String,
        member: IdentityId,
        reference: IdentityRef,
    },
    RemoveMember {
        group: String,
        member: IdentityId,
    },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GroupReport {
    pub kind: ResourceKind,
    pub mode: SyncMode,
    pub dry_run: bool,
    pub actions: Vec<GroupAction>,
}

impl GroupReport {
    pub fn is_noop(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn created(&self) -> usize {
        self.count(|a| matches!(a, GroupAction::CreateGroup { .. }))
    }

    pub fn added(&self) -> usize {
        self.count(|a| matches!(a, GroupAction::AddMember { .. }))
    }

    pub fn removed(&self) -> usize {
        self.count(|a| matches!(a, GroupAction::RemoveMember { .. }))
    }

    fn count(&self, f: impl Fn(&GroupAction) -> bool) -> usize {
        self.actions.iter().filter(|a| f(a)).count()
    }
}

// ---------------------------------------------------------------------------
// reconcile_groups
// ---------------------------------------------------------------------------

/// Converge the groups named in `spec` and their memberships.
///
/// `resolver` must resolve in [`IdentityRole::Member`].
pub fn reconcile_groups<C: PlatformClient + ?Sized>(
    client: &C,
    resolver: &mut IdentityResolver<'_, C>,
    spec: &GroupSpec,
    options: &GroupSyncOptions,
) -> Result<GroupReport, ReconcileError> {
    debug_assert_eq!(resolver.role(), IdentityRole::Member);
    let desired = spec.by_display_name(&options.naming)?;
    let mut report = GroupReport {
        kind: options.kind,
        mode: options.mode,
        dry_run: options.dry_run,
        actions: Vec::new(),
    };

    // Step 1: create missing groups.
    let existing = managed_groups(client, options)?;
    let existing_names: BTreeSet<String> =
        existing.iter().map(|g| g.display_name.clone()).collect();
    let to_create = diff::missing(desired.keys(), &existing_names);
    for name in &to_create {
        tracing::info!("creating {} {name}", options.kind);
        if !options.dry_run {
            client.create_group(options.kind, name)?;
        }
        report.actions.push(GroupAction::CreateGroup {
            group: name.clone(),
        });
    }

    // Step 2: re-fetch so just-created groups have ids.
    let groups = if to_create.is_empty() || options.dry_run {
        by_name(existing)
    } else {
        wait_for_groups(client, options, desired.keys())?
    };

    // Steps 3–5: membership diff per group.
    for (name, references) in &desired {
        let group = groups.get(name);
        let current = match group {
            Some(group) => client.list_members(group)?,
            // Only reachable in dry-run: the group would have been created.
            None if options.dry_run => BTreeSet::new(),
            None => {
                return Err(ReconcileError::GroupNotVisible {
                    name: name.clone(),
                    attempts: 1,
                })
            }
        };
        let wanted = resolver.resolve_all(references)?;
        let wanted_ids: BTreeSet<IdentityId> = wanted.keys().cloned().collect();
        let diff = diff::diff_sets(&wanted_ids, &current);
        let live = group.filter(|_| !options.dry_run);

        for member in diff.to_add {
            let reference = wanted[&member].clone();
            tracing::info!("adding {reference} to {name}");
            if let Some(group) = live {
                client.add_member(group, &member)?;
            }
            report.actions.push(GroupAction::AddMember {
                group: name.clone(),
                member,
                reference,
            });
        }

        match options.mode {
            SyncMode::FullSync => {
                for member in diff.to_remove {
                    tracing::info!("removing {member} from {name}");
                    if let Some(group) = live {
                        client.remove_member(group, &member)?;
                    }
                    report.actions.push(GroupAction::RemoveMember {
                        group: name.clone(),
                        member,
                    });
                }
            }
            SyncMode::Additive if !diff.to_remove.is_empty() => tracing::debug!(
                "leaving {} unlisted members in {name} (additive mode)",
                diff.to_remove.len()
            ),
            SyncMode::Additive => {}
        }
    }

    Ok(report)
}

fn managed_groups<C: PlatformClient + ?Sized>(
    client: &C,
    options: &GroupSyncOptions,
) -> Result<Vec<RemoteGroup>, ReconcileError> {
    Ok(client
        .list_groups(options.kind)?
        .into_iter()
        .filter(|g| options.naming.is_managed(&g.display_name))
        .collect())
}

fn by_name(groups: Vec<RemoteGroup>) -> BTreeMap<String, RemoteGroup> {
    groups
        .into_iter()
        .map(|g| (g.display_name.clone(), g))
        .collect()
}

/// Re-list managed groups until every name in `names` is visible.
fn wait_for_groups<'n, C: PlatformClient + ?Sized>(
    client: &C,
    options: &GroupSyncOptions,
    names: impl IntoIterator<Item = &'n String>,
) -> Result<BTreeMap<String, RemoteGroup>, ReconcileError> {
    let names: Vec<&String> = names.into_iter().collect();
    let mut attempt = 0;
    loop {
        let groups = by_name(managed_groups(client, options)?);
        let Some(pending) = names.iter().find(|n| !groups.contains_key(n.as_str())) else {
            return Ok(groups);
        };
        if attempt >= options.visibility.max_retries {
            return Err(ReconcileError::GroupNotVisible {
                name: (*pending).clone(),
                attempts: attempt + 1,
            });
        }
        let delay = options.visibility.delay_for_attempt(attempt);
        tracing::info!("waiting {delay:?} for {pending} to become visible");
        sleep(delay);
        attempt += 1;
    }
}

// ---------------------------------------------------------------------------
// Single-group operations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnsureOutcome {
    Created,
    AlreadyExists,
}

/// Create the group with this exact display name unless it exists.
pub fn ensure_group<C: PlatformClient + ?Sized>(
    client: &C,
    kind: ResourceKind,
    display_name: &str,
    dry_run: bool,
) -> Result<EnsureOutcome, ReconcileError> {
    if client.find_group(kind, display_name)?.is_some() {
        tracing::info!("{kind} {display_name} already exists");
        return Ok(EnsureOutcome::AlreadyExists);
    }
    tracing::info!("creating {kind} {display_name}");
    if !dry_run {
        client.create_group(kind, display_name)?;
    }
    Ok(EnsureOutcome::Created)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemoveOutcome {
    Removed,
    NotMember,
    GroupMissing,
}

/// Remove one member from the group with this exact display name.
///
/// A missing group or a non-member is reported, not treated as an error.
pub fn remove_member<C: PlatformClient + ?Sized>(
    client: &C,
    resolver: &mut IdentityResolver<'_, C>,
    kind: ResourceKind,
    display_name: &str,
    member: &IdentityRef,
    dry_run: bool,
) -> Result<RemoveOutcome, ReconcileError> {
    debug_assert_eq!(resolver.role(), IdentityRole::Member);
    let Some(group) = client
        .list_groups(kind)?
        .into_iter()
        .find(|g| g.display_name == display_name)
    else {
        tracing::warn!("{kind} {display_name} does not exist");
        return Ok(RemoveOutcome::GroupMissing);
    };

    let id = resolver.resolve(member)?;
    if !client.list_members(&group)?.contains(&id) {
        tracing::info!("{member} is not a member of {display_name}");
        return Ok(RemoveOutcome::NotMember);
    }
    tracing::info!("removing {member} from {display_name}");
    if !dry_run {
        client.remove_member(&group, &id)?;
    }
    Ok(RemoveOutcome::Removed)
}
