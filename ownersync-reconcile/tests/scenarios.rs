use std::collections::BTreeSet;
use std::fs;

use ownersync_core::{
    spec::load_ownership_spec, GroupSpec, IdentityId, IdentityRef, Naming, OwnershipSpec,
    ResourceKind, SyncMode,
};
use ownersync_platform::{
    fake::{Call, FakePlatform},
    RetryConfig,
};
use ownersync_reconcile::{
    pipeline::{sync_codeowners, sync_groups, PolicySyncOptions},
    GroupSyncOptions,
};
use tempfile::TempDir;

const REPO_ID: &str = "f9205fad-6169-452a-b070-09ef239c891b";
const BRANCH_REF: &str = "refs/heads/main";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn group_spec(groups: &[(&str, &[&str])]) -> GroupSpec {
    let mut spec = GroupSpec::default();
    for (name, members) in groups {
        spec.groups.insert(
            (*name).to_owned(),
            members.iter().map(|m| IdentityRef::from(*m)).collect(),
        );
    }
    spec
}

fn ownership_spec(paths: &[(&str, &[&str])]) -> OwnershipSpec {
    let mut spec = OwnershipSpec::default();
    for (path, owners) in paths {
        spec.paths.insert(
            (*path).to_owned(),
            owners.iter().map(|o| IdentityRef::from(*o)).collect(),
        );
    }
    spec
}

fn group_options(mode: SyncMode) -> GroupSyncOptions {
    GroupSyncOptions {
        kind: ResourceKind::Team,
        mode,
        visibility: RetryConfig::immediate(3),
        ..Default::default()
    }
}

fn policy_options() -> PolicySyncOptions {
    PolicySyncOptions {
        kind: ResourceKind::Team,
        naming: Naming::default(),
        repository: "web".into(),
        branch: "main".into(),
        dry_run: false,
    }
}

fn ids(items: &[&str]) -> BTreeSet<IdentityId> {
    items.iter().map(|s| IdentityId::from(*s)).collect()
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

#[test]
fn empty_remote_creates_group_then_adds_members() {
    init_logging();
    let fake = FakePlatform::new().with_user("a@x.com").with_user("b@x.com");
    let spec = group_spec(&[("@@team-x", &["a@x.com", "b@x.com"])]);

    sync_groups(&fake, &spec, &group_options(SyncMode::Additive)).expect("sync");

    assert_eq!(
        fake.calls(),
        vec![
            Call::CreateGroup {
                kind: ResourceKind::Team,
                name: "team-x-codeowners".into()
            },
            Call::AddMember {
                group: "team-x-codeowners".into(),
                member: IdentityId::from("a@x.com")
            },
            Call::AddMember {
                group: "team-x-codeowners".into(),
                member: IdentityId::from("b@x.com")
            },
        ]
    );
}

#[test]
fn group_sync_is_idempotent() {
    init_logging();
    let fake = FakePlatform::new()
        .with_user("a@x.com")
        .with_user("b@x.com")
        .with_group(ResourceKind::Team, "api-codeowners", &["stale@x.com"]);
    let spec = group_spec(&[
        ("@@api", &["a@x.com", "@@web"]),
        ("@@web", &["b@x.com"]),
    ]);
    let options = group_options(SyncMode::FullSync);

    let first = sync_groups(&fake, &spec, &options).expect("first sync");
    assert!(!first.is_noop());

    fake.clear_calls();
    let second = sync_groups(&fake, &spec, &options).expect("second sync");
    assert!(second.is_noop(), "second run must not change anything: {:?}", second.actions);
    assert!(fake.calls().is_empty());
}

#[test]
fn nested_group_members_are_added_by_descriptor() {
    let fake = FakePlatform::new()
        .with_user("b@x.com")
        .with_group(ResourceKind::Team, "web-codeowners", &["b@x.com"])
        .with_group(ResourceKind::Team, "api-codeowners", &[]);
    let spec = group_spec(&[("@@api", &["@@web"]), ("@@web", &["b@x.com"])]);

    sync_groups(&fake, &spec, &group_options(SyncMode::Additive)).expect("sync");
    assert_eq!(
        fake.members_of("api-codeowners"),
        BTreeSet::from([ownersync_platform::fake::group_descriptor("web-codeowners")])
    );
}

#[test]
fn full_sync_add_and_remove_sets_are_disjoint() {
    let fake = FakePlatform::new()
        .with_user("a@x.com")
        .with_user("b@x.com")
        .with_group(ResourceKind::Team, "x-codeowners", &["a@x.com", "c@x.com"]);
    let report = sync_groups(
        &fake,
        &group_spec(&[("@@x", &["a@x.com", "b@x.com"])]),
        &group_options(SyncMode::FullSync),
    )
    .expect("sync");

    assert_eq!(report.added(), 1);
    assert_eq!(report.removed(), 1);
    assert_eq!(fake.members_of("x-codeowners"), ids(&["a@x.com", "b@x.com"]));
}

#[test]
fn security_groups_use_their_own_listing() {
    let fake = FakePlatform::new()
        .with_user("a@x.com")
        .with_group(ResourceKind::Team, "x-codeowners", &["a@x.com"]);
    let options = GroupSyncOptions {
        kind: ResourceKind::SecurityGroup,
        ..group_options(SyncMode::Additive)
    };

    let report = sync_groups(&fake, &group_spec(&[("@@x", &["a@x.com"])]), &options).expect("sync");
    assert_eq!(report.created(), 1, "a team of the same name is not a security group");
}

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

#[test]
fn codeowners_file_creates_policy_with_owner_union() {
    init_logging();
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("CODEOWNERS.json");
    fs::write(
        &path,
        r#"{
            "functionalBlocks": {
                "db": { "owners": ["a@x.com"], "additionalApprovers": ["b@x.com"] }
            },
            "filemap": [ { "/db/": "db" } ]
        }"#,
    )
    .expect("write");
    let spec = load_ownership_spec(&path).expect("load");

    let fake = FakePlatform::new()
        .with_user("a@x.com")
        .with_user("b@x.com")
        .with_repository(REPO_ID, "web");

    let report = sync_codeowners(&fake, &spec, &policy_options()).expect("sync");
    assert_eq!(report.created(), 1);

    let calls = fake.calls();
    let [Call::CreatePolicy(created)] = calls.as_slice() else {
        panic!("expected a single policy creation, got {calls:?}");
    };
    assert_eq!(created.settings.filename_patterns, Some(vec!["/db/".to_owned()]));
    assert!(created.is_blocking);
    assert!(created.is_enabled);
    assert_eq!(created.settings.creator_vote_counts, Some(false));
    assert_eq!(created.settings.minimum_approver_count, Some(1));
    let reviewers: BTreeSet<_> = created.settings.required_reviewer_ids.iter().cloned().collect();
    assert_eq!(reviewers, ids(&["a@x.com", "b@x.com"]));
    let scope = &created.settings.scope[0];
    assert_eq!(scope.match_kind.as_deref(), Some("Exact"));
    assert_eq!(scope.ref_name.as_deref(), Some(BRANCH_REF));
    assert_eq!(scope.repository_id.as_deref(), Some(REPO_ID));
}

#[test]
fn reviewer_set_is_replaced_exactly() {
    let fake = FakePlatform::new()
        .with_user_identity(
            "two@x.com",
            ownersync_core::Identity {
                descriptor: "aad.two".into(),
                id: "id2".into(),
            },
        )
        .with_user_identity(
            "three@x.com",
            ownersync_core::Identity {
                descriptor: "aad.three".into(),
                id: "id3".into(),
            },
        )
        .with_repository(REPO_ID, "web")
        .with_policy(FakePlatform::policy(9, "/api/", &["id1", "id2"], REPO_ID, BRANCH_REF));

    sync_codeowners(
        &fake,
        &ownership_spec(&[("/api/", &["two@x.com", "three@x.com"])]),
        &policy_options(),
    )
    .expect("sync");

    let calls = fake.calls();
    let [Call::UpdatePolicy(updated)] = calls.as_slice() else {
        panic!("expected a single policy update, got {calls:?}");
    };
    assert_eq!(updated.id, 9);
    assert_eq!(updated.reviewer_ids(), ids(&["id2", "id3"]));
}

#[test]
fn matching_reviewer_set_issues_no_call() {
    let fake = FakePlatform::new()
        .with_user_identity(
            "one@x.com",
            ownersync_core::Identity {
                descriptor: "aad.one".into(),
                id: "id1".into(),
            },
        )
        .with_user_identity(
            "two@x.com",
            ownersync_core::Identity {
                descriptor: "aad.two".into(),
                id: "id2".into(),
            },
        )
        .with_repository(REPO_ID, "web")
        .with_policy(FakePlatform::policy(9, "/api/", &["id2", "id1"], REPO_ID, BRANCH_REF));

    let report = sync_codeowners(
        &fake,
        &ownership_spec(&[("/api/", &["one@x.com", "two@x.com"])]),
        &policy_options(),
    )
    .expect("sync");
    assert!(report.is_noop());
    assert!(fake.calls().is_empty());
}

#[test]
fn policy_sync_is_idempotent_and_caches_identities() {
    let fake = FakePlatform::new()
        .with_user("a@x.com")
        .with_user("b@x.com")
        .with_group(ResourceKind::Team, "db-codeowners", &[])
        .with_repository(REPO_ID, "web");
    let spec = ownership_spec(&[
        ("/db/", &["a@x.com", "@@db"]),
        ("/migrations/", &["a@x.com", "b@x.com", "@@db"]),
        ("/web/", &["b@x.com"]),
    ]);

    let first = sync_codeowners(&fake, &spec, &policy_options()).expect("first sync");
    assert_eq!(first.created(), 3);
    assert_eq!(fake.user_lookups(), 2, "each email is looked up once per run");
    assert_eq!(fake.group_lookups(), 1);

    fake.clear_calls();
    let second = sync_codeowners(&fake, &spec, &policy_options()).expect("second sync");
    assert!(second.is_noop());
    assert!(fake.calls().is_empty());
    assert_eq!(fake.user_lookups(), 4, "the cache does not outlive a run");
}

#[test]
fn removed_path_leaves_policy_in_place() {
    let fake = FakePlatform::new()
        .with_user("a@x.com")
        .with_repository(REPO_ID, "web")
        .with_policy(FakePlatform::policy(3, "/legacy/", &["a@x.com"], REPO_ID, BRANCH_REF));

    let spec = ownership_spec(&[("/db/", &["a@x.com"])]);
    let report = sync_codeowners(&fake, &spec, &policy_options()).expect("sync");
    assert_eq!(report.orphaned.len(), 1);
    assert_eq!(report.orphaned[0].path, "/legacy/");
    assert_eq!(fake.policies().len(), 2);
}
