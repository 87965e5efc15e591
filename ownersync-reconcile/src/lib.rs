//! # ownersync-reconcile
//!
//! The reconciliation and diff engine.
//!
//! Call [`pipeline::sync_groups`] to converge team/group membership to a
//! [`GroupSpec`](ownersync_core::GroupSpec), or [`pipeline::sync_codeowners`]
//! to converge required-reviewer branch policies to an
//! [`OwnershipSpec`](ownersync_core::OwnershipSpec). Each builds a fresh
//! [`IdentityResolver`] for the run.

pub mod diff;
pub mod error;
pub mod groups;
pub mod pipeline;
pub mod policies;
pub mod resolver;

pub use error::ReconcileError;
pub use groups::{GroupAction, GroupReport, GroupSyncOptions};
pub use policies::{PolicyAction, PolicyReport, PolicyTarget};
pub use resolver::IdentityResolver;
