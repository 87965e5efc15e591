//! The platform operations reconciliation depends on.

use std::collections::BTreeSet;

use ownersync_core::{
    BranchPolicy, Identity, IdentityId, NewReviewerPolicy, RemoteGroup, Repository, ResourceKind,
};

use crate::error::CallError;

/// Blocking access to the remote platform.
///
/// Every call either completes or fails with a [`CallError`]; implementations
/// enforce their own per-call deadline and retry transient failures before
/// returning. Team and security-group operations share one surface and are
/// selected by [`ResourceKind`].
pub trait PlatformClient {
    /// Every group of `kind` visible to the caller.
    fn list_groups(&self, kind: ResourceKind) -> Result<Vec<RemoteGroup>, CallError>;

    fn create_group(&self, kind: ResourceKind, display_name: &str) -> Result<(), CallError>;

    /// Graph descriptors of the direct members of `group`.
    fn list_members(&self, group: &RemoteGroup) -> Result<BTreeSet<IdentityId>, CallError>;

    fn add_member(&self, group: &RemoteGroup, member: &IdentityId) -> Result<(), CallError>;

    fn remove_member(&self, group: &RemoteGroup, member: &IdentityId) -> Result<(), CallError>;

    /// `None` when no user has this email.
    fn find_user(&self, email: &str) -> Result<Option<Identity>, CallError>;

    /// Look up a group of `kind` by exact display name.
    fn find_group(
        &self,
        kind: ResourceKind,
        display_name: &str,
    ) -> Result<Option<Identity>, CallError> {
        Ok(self
            .list_groups(kind)?
            .into_iter()
            .find(|g| g.display_name == display_name)
            .map(|g| g.identity()))
    }

    /// Look up a repository by name (or id). `None` when it does not exist.
    fn find_repository(&self, name: &str) -> Result<Option<Repository>, CallError>;

    /// Branch policies scoped to `repository_id` and `branch_ref`.
    fn list_branch_policies(
        &self,
        repository_id: &str,
        branch_ref: &str,
    ) -> Result<Vec<BranchPolicy>, CallError>;

    fn create_reviewer_policy(&self, policy: &NewReviewerPolicy) -> Result<(), CallError>;

    /// Replace a policy with `policy`, matched by id.
    fn update_reviewer_policy(&self, policy: &BranchPolicy) -> Result<(), CallError>;
}
