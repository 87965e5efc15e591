//! Required-reviewer branch policy reconciliation.
//!
//! One policy per spec path, located by exact path filter (`[path]`).
//! Missing policies are created; policies whose reviewer set differs from
//! the spec get their reviewers replaced. Policies for paths no longer in
//! the spec are reported as orphaned and left alone.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use ownersync_core::{BranchPolicy, IdentityId, IdentityRole, NewReviewerPolicy, OwnershipSpec};
use ownersync_platform::PlatformClient;

use crate::diff;
use crate::error::ReconcileError;
use crate::resolver::IdentityResolver;

/// Repository and fully-qualified branch ref the policies are scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyTarget {
    pub repository_id: String,
    pub branch_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum PolicyAction {
    CreatePolicy {
        path: String,
        reviewers: BTreeSet<IdentityId>,
    },
    UpdatePolicy {
        path: String,
        policy_id: u64,
        added: BTreeSet<IdentityId>,
        removed: BTreeSet<IdentityId>,
    },
}

/// A policy in scope whose path is not in the ownership file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanedPolicy {
    pub policy_id: u64,
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PolicyReport {
    pub dry_run: bool,
    pub actions: Vec<PolicyAction>,
    pub orphaned: Vec<OrphanedPolicy>,
}

impl PolicyReport {
    pub fn is_noop(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn created(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| matches!(a, PolicyAction::CreatePolicy { .. }))
            .count()
    }

    pub fn updated(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| matches!(a, PolicyAction::UpdatePolicy { .. }))
            .count()
    }
}

/// Converge required-reviewer policies on `target` to `spec`.
///
/// `resolver` must resolve in [`IdentityRole::Reviewer`].
pub fn reconcile_policies<C: PlatformClient + ?Sized>(
    client: &C,
    resolver: &mut IdentityResolver<'_, C>,
    spec: &OwnershipSpec,
    target: &PolicyTarget,
    dry_run: bool,
) -> Result<PolicyReport, ReconcileError> {
    debug_assert_eq!(resolver.role(), IdentityRole::Reviewer);

    let mut desired: BTreeMap<&str, BTreeSet<IdentityId>> = BTreeMap::new();
    for (path, owners) in &spec.paths {
        tracing::debug!("resolving reviewers for {path}");
        desired.insert(path.as_str(), resolver.resolve_set(owners)?);
    }

    let policies: Vec<BranchPolicy> = client
        .list_branch_policies(&target.repository_id, &target.branch_ref)?
        .into_iter()
        .filter(|p| in_scope(p, target))
        .collect();
    tracing::debug!(
        "{} reviewer policies on {} in {}",
        policies.len(),
        target.branch_ref,
        target.repository_id
    );

    let mut report = PolicyReport {
        dry_run,
        ..Default::default()
    };

    for (path, reviewers) in &desired {
        match policies.iter().find(|p| p.has_path_filter(path)) {
            None => {
                tracing::info!("creating required reviewer policy for {path}");
                if !dry_run {
                    let policy = NewReviewerPolicy::required_reviewers(
                        path,
                        reviewers,
                        &target.repository_id,
                        &target.branch_ref,
                    );
                    client.create_reviewer_policy(&policy)?;
                }
                report.actions.push(PolicyAction::CreatePolicy {
                    path: (*path).to_owned(),
                    reviewers: reviewers.clone(),
                });
            }
            Some(policy) => {
                let change = diff::diff_sets(reviewers, &policy.reviewer_ids());
                if change.is_empty() {
                    tracing::debug!("reviewers for {path} are up to date");
                    continue;
                }
                tracing::info!("updating reviewers for {path} (policy {})", policy.id);
                if !dry_run {
                    let mut updated = policy.clone().without_creation_metadata();
                    updated.settings.required_reviewer_ids = reviewers.iter().cloned().collect();
                    client.update_reviewer_policy(&updated)?;
                }
                report.actions.push(PolicyAction::UpdatePolicy {
                    path: (*path).to_owned(),
                    policy_id: policy.id,
                    added: change.to_add,
                    removed: change.to_remove,
                });
            }
        }
    }

    for policy in &policies {
        if let Some(path) = policy.single_path() {
            if !spec.contains_path(path) {
                tracing::warn!(
                    "policy {} for {path} is not in the CODEOWNERS file and will not be deleted",
                    policy.id
                );
                report.orphaned.push(OrphanedPolicy {
                    policy_id: policy.id,
                    path: path.to_owned(),
                });
            }
        }
    }

    Ok(report)
}

/// Required-reviewer policies (or untyped ones) scoped exactly to the target.
fn in_scope(policy: &BranchPolicy, target: &PolicyTarget) -> bool {
    let reviewer_type = policy.policy_type.is_none() || policy.is_required_reviewer();
    reviewer_type && policy.applies_to(&target.repository_id, &target.branch_ref)
}

#[cfg(test)]
mod tests {
    use ownersync_core::{IdentityRef, Naming, PolicyTypeRef, ResourceKind};
    use ownersync_platform::fake::{Call, FakePlatform};

    use super::*;

    const REPO: &str = "repo-1";
    const BRANCH: &str = "refs/heads/main";

    fn target() -> PolicyTarget {
        PolicyTarget {
            repository_id: REPO.into(),
            branch_ref: BRANCH.into(),
        }
    }

    fn spec(paths: &[(&str, &[&str])]) -> OwnershipSpec {
        let mut spec = OwnershipSpec::default();
        for (path, owners) in paths {
            spec.paths.insert(
                (*path).to_owned(),
                owners.iter().map(|o| IdentityRef::from(*o)).collect(),
            );
        }
        spec
    }

    fn run(
        fake: &FakePlatform,
        spec: &OwnershipSpec,
        dry_run: bool,
    ) -> Result<PolicyReport, ReconcileError> {
        let mut resolver = IdentityResolver::new(
            fake,
            ResourceKind::Team,
            Naming::default(),
            IdentityRole::Reviewer,
        );
        reconcile_policies(fake, &mut resolver, spec, &target(), dry_run)
    }

    #[test]
    fn prefix_and_parent_paths_do_not_match() {
        let fake = FakePlatform::new()
            .with_user("a@x.com")
            .with_policy(FakePlatform::policy(1, "/src/a", &["a@x.com"], REPO, BRANCH));

        let report = run(&fake, &spec(&[("/src/a/b", &["a@x.com"]), ("/src", &["a@x.com"])]), false)
            .expect("reconcile");
        assert_eq!(report.created(), 2);
        assert_eq!(report.updated(), 0);
        assert_eq!(report.orphaned, vec![OrphanedPolicy { policy_id: 1, path: "/src/a".into() }]);
    }

    #[test]
    fn update_strips_creation_metadata_and_preserves_other_fields() {
        let mut existing = FakePlatform::policy(5, "/db/", &["a@x.com"], REPO, BRANCH);
        existing.settings.minimum_approver_count = Some(2);
        existing.extra.insert("revision".into(), serde_json::json!(4));
        let fake = FakePlatform::new()
            .with_user("a@x.com")
            .with_user("b@x.com")
            .with_policy(existing);

        run(&fake, &spec(&[("/db/", &["a@x.com", "b@x.com"])]), false).expect("reconcile");

        let calls = fake.calls();
        let [Call::UpdatePolicy(sent)] = calls.as_slice() else {
            panic!("expected one update, got {calls:?}");
        };
        assert!(sent.created_by.is_none());
        assert!(sent.created_date.is_none());
        assert_eq!(sent.settings.minimum_approver_count, Some(2));
        assert_eq!(sent.extra["revision"], 4);
        assert_eq!(sent.reviewer_ids().len(), 2);
    }

    #[test]
    fn policies_outside_scope_are_ignored() {
        let other_branch = FakePlatform::policy(1, "/db/", &["a@x.com"], REPO, "refs/heads/dev");
        let mut other_type = FakePlatform::policy(2, "/db/", &["a@x.com"], REPO, BRANCH);
        other_type.policy_type = Some(PolicyTypeRef {
            id: "fa4e907d-c16b-4a4c-9dfa-4916e5d171ab".into(),
        });
        let fake = FakePlatform::new()
            .with_user("a@x.com")
            .with_policy(other_branch)
            .with_policy(other_type);

        let report = run(&fake, &spec(&[("/db/", &["a@x.com"])]), false).expect("reconcile");
        assert_eq!(report.created(), 1);
        assert!(report.orphaned.is_empty());
    }

    #[test]
    fn dry_run_reports_without_calls() {
        let fake = FakePlatform::new()
            .with_user("a@x.com")
            .with_user("b@x.com")
            .with_policy(FakePlatform::policy(1, "/api/", &["a@x.com"], REPO, BRANCH));

        let report = run(
            &fake,
            &spec(&[("/api/", &["b@x.com"]), ("/web/", &["a@x.com"])]),
            true,
        )
        .expect("reconcile");
        assert!(fake.calls().is_empty());
        assert_eq!((report.created(), report.updated()), (1, 1));
        match &report.actions[0] {
            PolicyAction::UpdatePolicy { added, removed, .. } => {
                assert!(added.contains(&IdentityId::from("b@x.com")));
                assert!(removed.contains(&IdentityId::from("a@x.com")));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn resolution_failure_happens_before_any_policy_call() {
        let fake = FakePlatform::new().with_user("a@x.com");
        let err = run(&fake, &spec(&[("/db/", &["a@x.com", "@@missing"])]), false).unwrap_err();
        assert!(matches!(err, ReconcileError::Resolution { .. }), "got: {err}");
        assert!(fake.calls().is_empty());
    }

    #[test]
    fn platform_failure_aborts_run() {
        let fake = FakePlatform::new()
            .with_user("a@x.com")
            .with_failing_mutations(400);
        let err = run(&fake, &spec(&[("/db/", &["a@x.com"]), ("/web/", &["a@x.com"])]), false)
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Call(_)), "got: {err}");
        assert!(fake.policies().is_empty());
    }
}
