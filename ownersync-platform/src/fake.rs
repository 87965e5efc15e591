//! In-memory [`PlatformClient`] for tests.
//!
//! Records every mutating call in order, counts identity lookups, and can
//! hide freshly created groups from listings for a number of reads to mimic
//! the platform's eventual consistency.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Map};

use ownersync_core::{
    BranchPolicy, Identity, IdentityId, NewReviewerPolicy, RemoteGroup, Repository, ResourceKind,
};

use crate::client::PlatformClient;
use crate::error::CallError;

/// A mutating call observed by the fake.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateGroup { kind: ResourceKind, name: String },
    AddMember { group: String, member: IdentityId },
    RemoveMember { group: String, member: IdentityId },
    CreatePolicy(NewReviewerPolicy),
    UpdatePolicy(BranchPolicy),
}

#[derive(Debug)]
struct StoredGroup {
    kind: ResourceKind,
    group: RemoteGroup,
    /// Listings left before the group becomes visible.
    hidden_for: u32,
}

#[derive(Debug, Default)]
struct State {
    groups: Vec<StoredGroup>,
    members: BTreeMap<IdentityId, BTreeSet<IdentityId>>,
    users: BTreeMap<String, Identity>,
    repositories: Vec<Repository>,
    policies: Vec<BranchPolicy>,
    next_policy_id: u64,
    calls: Vec<Call>,
    user_lookups: usize,
    group_lookups: usize,
    visibility_lag: u32,
    mutation_failure: Option<u16>,
}

#[derive(Debug, Default)]
pub struct FakePlatform {
    state: RefCell<State>,
}

/// Descriptor the fake assigns to a group with this display name.
pub fn group_descriptor(display_name: &str) -> IdentityId {
    IdentityId(format!("vssgp.{display_name}"))
}

/// Id the fake assigns to a group with this display name.
pub fn group_id(display_name: &str) -> IdentityId {
    IdentityId(format!("origin.{display_name}"))
}

fn remote_group(display_name: &str) -> RemoteGroup {
    RemoteGroup {
        id: group_id(display_name),
        descriptor: group_descriptor(display_name),
        display_name: display_name.to_owned(),
    }
}

impl FakePlatform {
    pub fn new() -> Self {
        let fake = Self::default();
        fake.state.borrow_mut().next_policy_id = 1;
        fake
    }

    /// A user whose descriptor and id are both the email itself.
    pub fn with_user(self, email: &str) -> Self {
        self.with_user_identity(
            email,
            Identity {
                descriptor: IdentityId::from(email),
                id: IdentityId::from(email),
            },
        )
    }

    pub fn with_user_identity(self, email: &str, identity: Identity) -> Self {
        self.state
            .borrow_mut()
            .users
            .insert(email.to_owned(), identity);
        self
    }

    /// An existing group whose members are given by descriptor.
    pub fn with_group(self, kind: ResourceKind, display_name: &str, members: &[&str]) -> Self {
        {
            let mut state = self.state.borrow_mut();
            let group = remote_group(display_name);
            state.members.insert(
                group.descriptor.clone(),
                members.iter().map(|m| IdentityId::from(*m)).collect(),
            );
            state.groups.push(StoredGroup {
                kind,
                group,
                hidden_for: 0,
            });
        }
        self
    }

    pub fn with_repository(self, id: &str, name: &str) -> Self {
        self.state.borrow_mut().repositories.push(Repository {
            id: id.to_owned(),
            name: name.to_owned(),
        });
        self
    }

    pub fn with_policy(self, policy: BranchPolicy) -> Self {
        {
            let mut state = self.state.borrow_mut();
            state.next_policy_id = state.next_policy_id.max(policy.id + 1);
            state.policies.push(policy);
        }
        self
    }

    /// Newly created groups stay out of listings for `listings` reads.
    pub fn with_visibility_lag(self, listings: u32) -> Self {
        self.state.borrow_mut().visibility_lag = listings;
        self
    }

    /// Every mutating call fails with this HTTP status.
    pub fn with_failing_mutations(self, status: u16) -> Self {
        self.state.borrow_mut().mutation_failure = Some(status);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn user_lookups(&self) -> usize {
        self.state.borrow().user_lookups
    }

    pub fn group_lookups(&self) -> usize {
        self.state.borrow().group_lookups
    }

    /// Current member descriptors of the group with this display name.
    pub fn members_of(&self, display_name: &str) -> BTreeSet<IdentityId> {
        self.state
            .borrow()
            .members
            .get(&group_descriptor(display_name))
            .cloned()
            .unwrap_or_default()
    }

    pub fn policies(&self) -> Vec<BranchPolicy> {
        self.state.borrow().policies.clone()
    }

    /// A required-reviewer policy as the platform would return it, including
    /// creation metadata.
    pub fn policy(
        id: u64,
        path: &str,
        reviewers: &[&str],
        repository_id: &str,
        branch_ref: &str,
    ) -> BranchPolicy {
        let reviewers: BTreeSet<IdentityId> =
            reviewers.iter().map(|r| IdentityId::from(*r)).collect();
        let new =
            NewReviewerPolicy::required_reviewers(path, &reviewers, repository_id, branch_ref);
        stored_policy(id, new)
    }

    fn record(&self, call: Call) -> Result<(), CallError> {
        let mut state = self.state.borrow_mut();
        if let Some(status) = state.mutation_failure {
            return Err(CallError::Status {
                operation: format!("{call:?}"),
                status,
                body: "injected failure".to_owned(),
            });
        }
        state.calls.push(call);
        Ok(())
    }
}

fn stored_policy(id: u64, new: NewReviewerPolicy) -> BranchPolicy {
    BranchPolicy {
        id,
        is_blocking: new.is_blocking,
        is_enabled: new.is_enabled,
        policy_type: Some(new.policy_type),
        settings: new.settings,
        created_by: Some(json!({ "displayName": "Project Collection Build Service" })),
        created_date: Some("2024-01-01T00:00:00Z".to_owned()),
        extra: Map::new(),
    }
}

impl PlatformClient for FakePlatform {
    fn list_groups(&self, kind: ResourceKind) -> Result<Vec<RemoteGroup>, CallError> {
        let mut state = self.state.borrow_mut();
        let mut visible = Vec::new();
        for stored in state.groups.iter_mut().filter(|g| g.kind == kind) {
            if stored.hidden_for == 0 {
                visible.push(stored.group.clone());
            } else {
                stored.hidden_for -= 1;
            }
        }
        Ok(visible)
    }

    fn create_group(&self, kind: ResourceKind, display_name: &str) -> Result<(), CallError> {
        self.record(Call::CreateGroup {
            kind,
            name: display_name.to_owned(),
        })?;
        let mut state = self.state.borrow_mut();
        let group = remote_group(display_name);
        state.members.entry(group.descriptor.clone()).or_default();
        let hidden_for = state.visibility_lag;
        state.groups.push(StoredGroup {
            kind,
            group,
            hidden_for,
        });
        Ok(())
    }

    fn list_members(&self, group: &RemoteGroup) -> Result<BTreeSet<IdentityId>, CallError> {
        Ok(self
            .state
            .borrow()
            .members
            .get(&group.descriptor)
            .cloned()
            .unwrap_or_default())
    }

    fn add_member(&self, group: &RemoteGroup, member: &IdentityId) -> Result<(), CallError> {
        self.record(Call::AddMember {
            group: group.display_name.clone(),
            member: member.clone(),
        })?;
        self.state
            .borrow_mut()
            .members
            .entry(group.descriptor.clone())
            .or_default()
            .insert(member.clone());
        Ok(())
    }

    fn remove_member(&self, group: &RemoteGroup, member: &IdentityId) -> Result<(), CallError> {
        self.record(Call::RemoveMember {
            group: group.display_name.clone(),
            member: member.clone(),
        })?;
        if let Some(members) = self.state.borrow_mut().members.get_mut(&group.descriptor) {
            members.remove(member);
        }
        Ok(())
    }

    fn find_user(&self, email: &str) -> Result<Option<Identity>, CallError> {
        let mut state = self.state.borrow_mut();
        state.user_lookups += 1;
        Ok(state.users.get(email).cloned())
    }

    fn find_group(
        &self,
        kind: ResourceKind,
        display_name: &str,
    ) -> Result<Option<Identity>, CallError> {
        let mut state = self.state.borrow_mut();
        state.group_lookups += 1;
        Ok(state
            .groups
            .iter()
            .find(|g| g.kind == kind && g.hidden_for == 0 && g.group.display_name == display_name)
            .map(|g| g.group.identity()))
    }

    fn find_repository(&self, name: &str) -> Result<Option<Repository>, CallError> {
        Ok(self
            .state
            .borrow()
            .repositories
            .iter()
            .find(|r| r.name == name || r.id == name)
            .cloned())
    }

    fn list_branch_policies(
        &self,
        repository_id: &str,
        branch_ref: &str,
    ) -> Result<Vec<BranchPolicy>, CallError> {
        Ok(self
            .state
            .borrow()
            .policies
            .iter()
            .filter(|p| p.applies_to(repository_id, branch_ref))
            .cloned()
            .collect())
    }

    fn create_reviewer_policy(&self, policy: &NewReviewerPolicy) -> Result<(), CallError> {
        self.record(Call::CreatePolicy(policy.clone()))?;
        let mut state = self.state.borrow_mut();
        let id = state.next_policy_id;
        state.next_policy_id += 1;
        state.policies.push(stored_policy(id, policy.clone()));
        Ok(())
    }

    fn update_reviewer_policy(&self, policy: &BranchPolicy) -> Result<(), CallError> {
        if policy.created_by.is_some() || policy.created_date.is_some() {
            return Err(CallError::Status {
                operation: "update reviewer policy".to_owned(),
                status: 400,
                body: "creation metadata is read-only".to_owned(),
            });
        }
        self.record(Call::UpdatePolicy(policy.clone()))?;
        let mut state = self.state.borrow_mut();
        match state.policies.iter_mut().find(|p| p.id == policy.id) {
            Some(existing) => {
                let created_by = existing.created_by.take();
                let created_date = existing.created_date.take();
                *existing = BranchPolicy {
                    created_by,
                    created_date,
                    ..policy.clone()
                };
                Ok(())
            }
            None => Err(CallError::Status {
                operation: "update reviewer policy".to_owned(),
                status: 404,
                body: format!("policy {} not found", policy.id),
            }),
        }
    }
}
