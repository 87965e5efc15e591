//! Run-level entry points used by the CLI.
//!
//! Each entry point builds its own [`IdentityResolver`], so identity caching
//! is scoped to exactly one reconciliation run.

use ownersync_core::{
    types::branch_ref, GroupSpec, IdentityRef, IdentityRole, Naming, OwnershipSpec, Repository,
    ResourceKind,
};
use ownersync_platform::PlatformClient;

use crate::error::ReconcileError;
use crate::groups::{self, GroupReport, GroupSyncOptions, RemoveOutcome};
use crate::policies::{self, PolicyReport, PolicyTarget};
use crate::resolver::IdentityResolver;

/// Options for a codeowners run.
#[derive(Debug, Clone)]
pub struct PolicySyncOptions {
    /// Resource kind `@@` references resolve against.
    pub kind: ResourceKind,
    pub naming: Naming,
    /// Repository name or id.
    pub repository: String,
    /// Branch name or fully-qualified ref.
    pub branch: String,
    pub dry_run: bool,
}

/// Converge groups and memberships to `spec`.
pub fn sync_groups<C: PlatformClient + ?Sized>(
    client: &C,
    spec: &GroupSpec,
    options: &GroupSyncOptions,
) -> Result<GroupReport, ReconcileError> {
    let mut resolver = IdentityResolver::new(
        client,
        options.kind,
        options.naming.clone(),
        IdentityRole::Member,
    );
    groups::reconcile_groups(client, &mut resolver, spec, options)
}

/// Converge required-reviewer policies of one repository branch to `spec`.
pub fn sync_codeowners<C: PlatformClient + ?Sized>(
    client: &C,
    spec: &OwnershipSpec,
    options: &PolicySyncOptions,
) -> Result<PolicyReport, ReconcileError> {
    let repository = find_repository(client, &options.repository)?;
    let target = PolicyTarget {
        repository_id: repository.id,
        branch_ref: branch_ref(&options.branch),
    };
    let mut resolver = IdentityResolver::new(
        client,
        options.kind,
        options.naming.clone(),
        IdentityRole::Reviewer,
    );
    policies::reconcile_policies(client, &mut resolver, spec, &target, options.dry_run)
}

/// Remove a single member from a group addressed by exact display name.
pub fn remove_group_member<C: PlatformClient + ?Sized>(
    client: &C,
    kind: ResourceKind,
    display_name: &str,
    member: &IdentityRef,
    dry_run: bool,
) -> Result<RemoveOutcome, ReconcileError> {
    // Exact display names: `@@` members resolve without prefix/suffix.
    let mut resolver =
        IdentityResolver::new(client, kind, Naming::new("", ""), IdentityRole::Member);
    groups::remove_member(client, &mut resolver, kind, display_name, member, dry_run)
}

pub fn find_repository<C: PlatformClient + ?Sized>(
    client: &C,
    name: &str,
) -> Result<Repository, ReconcileError> {
    client
        .find_repository(name)?
        .ok_or_else(|| ReconcileError::RepositoryNotFound {
            name: name.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use ownersync_platform::fake::FakePlatform;

    use super::*;

    #[test]
    fn unknown_repository_fails_before_resolution() {
        let fake = FakePlatform::new().with_user("a@x.com");
        let mut spec = OwnershipSpec::default();
        spec.paths
            .insert("/db/".into(), [IdentityRef::from("a@x.com")].into_iter().collect());
        let options = PolicySyncOptions {
            kind: ResourceKind::Team,
            naming: Naming::default(),
            repository: "missing".into(),
            branch: "main".into(),
            dry_run: false,
        };

        let err = sync_codeowners(&fake, &spec, &options).unwrap_err();
        assert!(matches!(err, ReconcileError::RepositoryNotFound { .. }), "got: {err}");
        assert_eq!(fake.user_lookups(), 0);
    }

    #[test]
    fn repository_can_be_addressed_by_id() {
        let fake = FakePlatform::new().with_repository("f9205fad", "web");
        assert_eq!(find_repository(&fake, "f9205fad").expect("by id").name, "web");
        assert_eq!(find_repository(&fake, "web").expect("by name").id, "f9205fad");
    }
}
