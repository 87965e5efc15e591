//! # ownersync-platform
//!
//! The remote side of reconciliation: the [`PlatformClient`] trait, the Azure
//! DevOps implementation over blocking HTTP, and retry with backoff for
//! transient call failures.
//!
//! Enable the `testing` feature for [`fake::FakePlatform`], an in-memory
//! platform that records every mutating call.

pub mod azure;
pub mod client;
pub mod config;
pub mod error;
pub mod retry;

#[cfg(any(test, feature = "testing"))]
pub mod fake;

pub use azure::AzureDevOpsClient;
pub use client::PlatformClient;
pub use config::PlatformConfig;
pub use error::CallError;
pub use retry::{with_retry, RetryConfig};
