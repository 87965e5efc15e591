//! Error types for ownersync-reconcile.

use thiserror::Error;

use ownersync_core::{IdentityRef, SpecError};
use ownersync_platform::CallError;

/// Everything that aborts a reconciliation run. None of these are recovered
/// from within a run; every mutation is idempotent, so a failed run can be
/// re-executed as is.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A platform call failed (after any transient retries).
    #[error("platform call failed: {0}")]
    Call(#[from] CallError),

    /// The desired-state spec is unusable.
    #[error("spec error: {0}")]
    Spec(#[from] SpecError),

    /// A reference names a user or group the platform does not know.
    #[error("cannot resolve identity {reference}: no matching {looked_up} found")]
    Resolution {
        reference: IdentityRef,
        looked_up: String,
    },

    /// A group was created but never showed up in listings.
    #[error("group {name:?} is still not visible after {attempts} listings")]
    GroupNotVisible { name: String, attempts: u32 },

    #[error("repository {name:?} not found")]
    RepositoryNotFound { name: String },
}
