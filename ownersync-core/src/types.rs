//! Domain types for ownersync.
//!
//! Desired state (`GroupSpec`, `OwnershipSpec`) is purely declarative and only
//! ever holds [`IdentityRef`]s. Remote records (`RemoteGroup`, `BranchPolicy`,
//! `Repository`) carry platform ids and are re-fetched every run.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SpecError;

/// Marker prefix distinguishing a group/team reference from a user email.
pub const GROUP_MARKER: &str = "@@";

/// Default display-name suffix applied to managed groups.
pub const DEFAULT_GROUP_SUFFIX: &str = "-codeowners";

/// Policy type id of the platform's "required reviewers" branch policy.
pub const REQUIRED_REVIEWER_POLICY_TYPE: &str = "fd2167ab-b0be-447a-8ec8-39368250530e";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A declarative identity: `@@name` for a group/team, otherwise a user email.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityRef(pub String);

impl IdentityRef {
    /// `true` when this reference names a group/team rather than a user.
    pub fn is_group(&self) -> bool {
        self.0.starts_with(GROUP_MARKER)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for IdentityRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for IdentityRef {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// An opaque platform-assigned identifier (descriptor, storage key, origin id…).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(pub String);

impl IdentityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for IdentityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for IdentityId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which platform resource a group spec is reconciled against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// Project team (created through the core teams API).
    #[default]
    Team,
    /// Security group (created through the graph API).
    SecurityGroup,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Team => write!(f, "team"),
            ResourceKind::SecurityGroup => write!(f, "group"),
        }
    }
}

/// How membership differences are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// Only add missing members; extra members are left alone.
    #[default]
    Additive,
    /// Add missing members and remove members absent from the spec.
    FullSync,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Additive => write!(f, "additive"),
            SyncMode::FullSync => write!(f, "full-sync"),
        }
    }
}

/// Which platform field a resolved identity stands for.
///
/// Membership APIs address subjects by graph descriptor; required-reviewer
/// policies address them by identity id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityRole {
    Member,
    Reviewer,
}

// ---------------------------------------------------------------------------
// Naming convention
// ---------------------------------------------------------------------------

/// Maps spec group names to remote display names: `<prefix><name><suffix>`,
/// with any leading `@@` marker dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Naming {
    pub prefix: String,
    pub suffix: String,
}

impl Default for Naming {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            suffix: DEFAULT_GROUP_SUFFIX.to_owned(),
        }
    }
}

impl Naming {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    /// Remote display name for a spec name or `@@` reference.
    pub fn display_name(&self, name: &str) -> String {
        let bare = name.strip_prefix(GROUP_MARKER).unwrap_or(name);
        format!("{}{}{}", self.prefix, bare, self.suffix)
    }

    /// `true` if a remote display name follows this convention.
    pub fn is_managed(&self, display_name: &str) -> bool {
        display_name.len() > self.prefix.len() + self.suffix.len()
            && display_name.starts_with(&self.prefix)
            && display_name.ends_with(&self.suffix)
    }
}

// ---------------------------------------------------------------------------
// Desired state
// ---------------------------------------------------------------------------

/// Desired groups: spec name → member references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupSpec {
    pub groups: BTreeMap<String, BTreeSet<IdentityRef>>,
}

impl GroupSpec {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Re-key the spec by remote display name.
    ///
    /// Fails if two spec names collapse onto the same display name
    /// (e.g. `@@core` and `core`).
    pub fn by_display_name(
        &self,
        naming: &Naming,
    ) -> Result<BTreeMap<String, BTreeSet<IdentityRef>>, SpecError> {
        let mut out = BTreeMap::new();
        let mut origin: BTreeMap<String, &str> = BTreeMap::new();
        for (name, members) in &self.groups {
            let display_name = naming.display_name(name);
            if let Some(first) = origin.insert(display_name.clone(), name) {
                return Err(SpecError::DuplicateName {
                    first: first.to_owned(),
                    second: name.clone(),
                    display_name,
                });
            }
            out.insert(display_name, members.clone());
        }
        Ok(out)
    }
}

/// A named unit of ownership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionalBlock {
    #[serde(default)]
    pub owners: BTreeSet<IdentityRef>,
    #[serde(default)]
    pub additional_approvers: BTreeSet<IdentityRef>,
}

impl FunctionalBlock {
    /// `owners ∪ additionalApprovers`; an identity in both appears once.
    pub fn effective_owners(&self) -> BTreeSet<IdentityRef> {
        self.owners
            .union(&self.additional_approvers)
            .cloned()
            .collect()
    }
}

/// Desired required reviewers: path pattern → owner references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnershipSpec {
    pub paths: BTreeMap<String, BTreeSet<IdentityRef>>,
}

impl OwnershipSpec {
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.paths.contains_key(path)
    }
}

// ---------------------------------------------------------------------------
// Remote records
// ---------------------------------------------------------------------------

/// Both platform ids of a resolved subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Graph descriptor used by membership APIs.
    pub descriptor: IdentityId,
    /// Identity id used by required-reviewer policies.
    pub id: IdentityId,
}

impl Identity {
    pub fn for_role(&self, role: IdentityRole) -> &IdentityId {
        match role {
            IdentityRole::Member => &self.descriptor,
            IdentityRole::Reviewer => &self.id,
        }
    }
}

/// A live team or security group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteGroup {
    /// Team id or group origin id.
    pub id: IdentityId,
    pub descriptor: IdentityId,
    pub display_name: String,
}

impl RemoteGroup {
    pub fn identity(&self) -> Identity {
        Identity {
            descriptor: self.descriptor.clone(),
            id: self.id.clone(),
        }
    }
}

/// A git repository, looked up by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: String,
    pub name: String,
}

/// `{ "id": "<policy type id>" }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTypeRef {
    pub id: String,
}

/// Where a branch policy applies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyScope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_id: Option<String>,
}

/// Settings block of a required-reviewer policy. Unknown keys are kept in
/// `extra` and written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySettings {
    #[serde(default)]
    pub required_reviewer_ids: Vec<IdentityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename_patterns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_vote_counts: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_approver_count: Option<u32>,
    #[serde(default)]
    pub scope: Vec<PolicyScope>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A live branch policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchPolicy {
    pub id: u64,
    #[serde(default)]
    pub is_blocking: bool,
    #[serde(default)]
    pub is_enabled: bool,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub policy_type: Option<PolicyTypeRef>,
    #[serde(default)]
    pub settings: PolicySettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BranchPolicy {
    /// Exact path-filter match: the filter list must be exactly `[path]`.
    pub fn has_path_filter(&self, path: &str) -> bool {
        matches!(self.settings.filename_patterns.as_deref(), Some([only]) if only == path)
    }

    /// The single path this policy filters on, if it has exactly one.
    pub fn single_path(&self) -> Option<&str> {
        match self.settings.filename_patterns.as_deref() {
            Some([only]) => Some(only.as_str()),
            _ => None,
        }
    }

    pub fn reviewer_ids(&self) -> BTreeSet<IdentityId> {
        self.settings.required_reviewer_ids.iter().cloned().collect()
    }

    pub fn is_required_reviewer(&self) -> bool {
        self.policy_type
            .as_ref()
            .is_some_and(|t| t.id == REQUIRED_REVIEWER_POLICY_TYPE)
    }

    /// `true` if any scope entry targets exactly this repository and ref.
    pub fn applies_to(&self, repository_id: &str, branch_ref: &str) -> bool {
        self.settings.scope.iter().any(|s| {
            s.repository_id.as_deref() == Some(repository_id)
                && s.ref_name.as_deref() == Some(branch_ref)
        })
    }

    /// Drop server-populated creation metadata; the update endpoint rejects it.
    pub fn without_creation_metadata(mut self) -> Self {
        self.created_by = None;
        self.created_date = None;
        self
    }
}

/// Body of a new required-reviewer policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReviewerPolicy {
    pub is_blocking: bool,
    pub is_enabled: bool,
    #[serde(rename = "type")]
    pub policy_type: PolicyTypeRef,
    pub settings: PolicySettings,
}

impl NewReviewerPolicy {
    /// Blocking, enabled, single-path policy with one required approval,
    /// scoped exactly to `branch_ref` in `repository_id`.
    pub fn required_reviewers(
        path: &str,
        reviewers: &BTreeSet<IdentityId>,
        repository_id: &str,
        branch_ref: &str,
    ) -> Self {
        Self {
            is_blocking: true,
            is_enabled: true,
            policy_type: PolicyTypeRef {
                id: REQUIRED_REVIEWER_POLICY_TYPE.to_owned(),
            },
            settings: PolicySettings {
                required_reviewer_ids: reviewers.iter().cloned().collect(),
                filename_patterns: Some(vec![path.to_owned()]),
                creator_vote_counts: Some(false),
                minimum_approver_count: Some(1),
                scope: vec![PolicyScope {
                    match_kind: Some("Exact".to_owned()),
                    ref_name: Some(branch_ref.to_owned()),
                    repository_id: Some(repository_id.to_owned()),
                }],
                extra: Map::new(),
            },
        }
    }
}

/// `main` → `refs/heads/main`; fully-qualified refs pass through.
pub fn branch_ref(branch: &str) -> String {
    if branch.starts_with("refs/") {
        branch.to_owned()
    } else {
        format!("refs/heads/{branch}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
