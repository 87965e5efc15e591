pub mod codeowners;
pub mod group;
pub mod groups;

use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;

use ownersync_core::{Naming, DEFAULT_GROUP_SUFFIX};
use ownersync_platform::{
    config::{DEFAULT_CORE_URL, DEFAULT_GRAPH_URL},
    AzureDevOpsClient, PlatformConfig, RetryConfig,
};

/// Token variable the Azure CLI devops extension reads.
const AZURE_CLI_TOKEN_ENV: &str = "AZURE_DEVOPS_EXT_PAT";

/// Connection and naming settings shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Azure DevOps organization.
    #[arg(long, global = true, env = "OWNERSYNC_ORG")]
    pub org: Option<String>,

    /// Azure DevOps project.
    #[arg(long, global = true, env = "OWNERSYNC_PROJECT")]
    pub project: Option<String>,

    /// Access token. Falls back to AZURE_DEVOPS_EXT_PAT.
    #[arg(long, global = true, env = "OWNERSYNC_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Deadline for a single HTTP call.
    #[arg(long, global = true, default_value_t = 30, value_name = "SECS")]
    pub timeout_secs: u64,

    /// Retries for transient failures (timeouts, 429, 5xx).
    #[arg(long, global = true, default_value_t = 3)]
    pub retries: u32,

    /// Prepended to every `@@` group name.
    #[arg(long, global = true, default_value = "")]
    pub prefix: String,

    /// Appended to every `@@` group name.
    #[arg(long, global = true, default_value = DEFAULT_GROUP_SUFFIX)]
    pub suffix: String,

    #[arg(long, global = true, hide = true, default_value = DEFAULT_CORE_URL)]
    pub core_url: String,

    #[arg(long, global = true, hide = true, default_value = DEFAULT_GRAPH_URL)]
    pub graph_url: String,

    /// Debug logging (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl GlobalArgs {
    pub fn naming(&self) -> Naming {
        Naming::new(self.prefix.clone(), self.suffix.clone())
    }

    /// Build the Azure DevOps client. Call only after the spec has loaded.
    pub fn client(&self) -> Result<AzureDevOpsClient> {
        let organization = non_empty(self.org.as_deref())
            .context("missing organization: pass --org or set OWNERSYNC_ORG")?;
        let project = non_empty(self.project.as_deref())
            .context("missing project: pass --project or set OWNERSYNC_PROJECT")?;
        let token = match non_empty(self.token.as_deref()) {
            Some(token) => token.to_owned(),
            None => match env::var(AZURE_CLI_TOKEN_ENV) {
                Ok(token) if !token.trim().is_empty() => token,
                _ => bail!(
                    "missing access token: pass --token or set OWNERSYNC_TOKEN \
                     or {AZURE_CLI_TOKEN_ENV}"
                ),
            },
        };

        let mut config = PlatformConfig::new(organization, project, token);
        config.core_url = self.core_url.clone();
        config.graph_url = self.graph_url.clone();
        config.timeout = Duration::from_secs(self.timeout_secs);
        config.retry = RetryConfig {
            max_retries: self.retries,
            ..RetryConfig::default()
        };
        tracing::debug!(
            "connecting to {} (timeout {:?}, {} retries)",
            config.project_url(),
            config.timeout,
            config.retry.max_retries
        );
        Ok(AzureDevOpsClient::new(config))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// `[dry-run] ` in front of every line describing planned changes.
pub fn dry_run_prefix(dry_run: bool) -> &'static str {
    if dry_run {
        "[dry-run] "
    } else {
        ""
    }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to serialize report JSON")?
    );
    Ok(())
}
