//! Shared model for ownersync.
//!
//! [`types`] holds identity references, the desired group and ownership
//! state, and the remote records they are reconciled against. [`spec`]
//! turns `CODEGROUPS` / `CODEOWNERS` files into that desired state and
//! reports problems as [`SpecError`].

pub mod error;
pub mod spec;
pub mod types;

pub use error::SpecError;
pub use types::{
    branch_ref, BranchPolicy, FunctionalBlock, GroupSpec, Identity, IdentityId, IdentityRef,
    IdentityRole, Naming, NewReviewerPolicy, OwnershipSpec, PolicyScope, PolicySettings,
    PolicyTypeRef, RemoteGroup, Repository, ResourceKind, SyncMode, DEFAULT_GROUP_SUFFIX,
    GROUP_MARKER, REQUIRED_REVIEWER_POLICY_TYPE,
};
