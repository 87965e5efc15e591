//! Connection settings for the Azure DevOps client.

use std::time::Duration;

use crate::retry::RetryConfig;

/// Default organization-scoped REST host.
pub const DEFAULT_CORE_URL: &str = "https://dev.azure.com";

/// Default host of the graph (identity) APIs.
pub const DEFAULT_GRAPH_URL: &str = "https://vssps.dev.azure.com";

#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub organization: String,
    pub project: String,
    /// Bearer token sent with every request.
    pub token: String,
    pub core_url: String,
    pub graph_url: String,
    /// Deadline for a single HTTP call, including connect and body read.
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl PlatformConfig {
    pub fn new(
        organization: impl Into<String>,
        project: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            organization: organization.into(),
            project: project.into(),
            token: token.into(),
            core_url: DEFAULT_CORE_URL.to_owned(),
            graph_url: DEFAULT_GRAPH_URL.to_owned(),
            timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }

    /// `https://dev.azure.com/<org>`
    pub fn organization_url(&self) -> String {
        format!("{}/{}", self.core_url.trim_end_matches('/'), self.organization)
    }

    /// `https://dev.azure.com/<org>/<project>`
    pub fn project_url(&self) -> String {
        format!("{}/{}", self.organization_url(), self.project)
    }

    /// `https://vssps.dev.azure.com/<org>`
    pub fn graph_base_url(&self) -> String {
        format!("{}/{}", self.graph_url.trim_end_matches('/'), self.organization)
    }
}
