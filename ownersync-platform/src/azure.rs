//! Azure DevOps implementation of [`PlatformClient`] over blocking HTTP.
//!
//! Every request carries the configured per-call deadline (agent timeout).
//! Idempotent requests (GET, PUT, DELETE, and the read-only subject query)
//! are retried on transient failures; creations (POST) run exactly once so a
//! lost response never turns into a duplicate team or policy.

use std::collections::{BTreeMap, BTreeSet};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use ownersync_core::{
    BranchPolicy, Identity, IdentityId, NewReviewerPolicy, RemoteGroup, Repository, ResourceKind,
    REQUIRED_REVIEWER_POLICY_TYPE,
};

use crate::client::PlatformClient;
use crate::config::PlatformConfig;
use crate::error::CallError;
use crate::retry::{with_retry, RetryConfig};

const GRAPH_API_VERSION: &str = "7.1-preview.1";
const TEAMS_API_VERSION: &str = "7.1-preview.3";
const GIT_API_VERSION: &str = "7.1";
const POLICY_API_VERSION: &str = "7.1";

const CONTINUATION_HEADER: &str = "x-ms-continuationtoken";
const TEAMS_PAGE_SIZE: usize = 100;

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ValueList<T> {
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphGroup {
    display_name: String,
    descriptor: String,
    #[serde(default)]
    origin_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Team {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMembership {
    member_descriptor: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphSubject {
    descriptor: String,
    #[serde(default)]
    mail_address: Option<String>,
    #[serde(default)]
    principal_name: Option<String>,
}

impl GraphSubject {
    fn matches_email(&self, email: &str) -> bool {
        [&self.mail_address, &self.principal_name]
            .into_iter()
            .flatten()
            .any(|candidate| candidate.eq_ignore_ascii_case(email))
    }
}

#[derive(Debug, Deserialize)]
struct StorageKey {
    value: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct AzureDevOpsClient {
    agent: ureq::Agent,
    config: PlatformConfig,
}

impl AzureDevOpsClient {
    pub fn new(config: PlatformConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Self { agent, config }
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    fn request(&self, method: &str, url: &str, api_version: &str) -> ureq::Request {
        tracing::debug!("{method} {url}");
        self.agent
            .request(method, url)
            .query("api-version", api_version)
            .set("Authorization", &format!("Bearer {}", self.config.token))
            .set("Accept", "application/json")
    }

    /// Execute `send`, retrying transient failures only when `idempotent`.
    fn call<F>(
        &self,
        operation: &str,
        idempotent: bool,
        send: F,
    ) -> Result<ureq::Response, CallError>
    where
        F: Fn() -> Result<ureq::Response, ureq::Error>,
    {
        let once = RetryConfig::no_retry();
        let retry = if idempotent { &self.config.retry } else { &once };
        with_retry(retry, operation, || send().map_err(|e| call_error(operation, e)))
    }

    /// GET every page of a `{ "value": [...] }` listing, following
    /// continuation tokens.
    fn get_all<T: DeserializeOwned>(
        &self,
        operation: &str,
        url: &str,
        api_version: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, CallError> {
        let mut items = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let response = self.call(operation, true, || {
                let mut req = self.request("GET", url, api_version);
                for (key, value) in query {
                    req = req.query(key, value);
                }
                if let Some(token) = &continuation {
                    req = req.query("continuationToken", token);
                }
                req.call()
            })?;
            let next = response
                .header(CONTINUATION_HEADER)
                .filter(|t| !t.is_empty())
                .map(str::to_owned);
            let page: ValueList<T> = decode(operation, response)?;
            items.extend(page.value);
            match next {
                Some(token) => continuation = Some(token),
                None => return Ok(items),
            }
        }
    }

    fn graph_groups(&self) -> Result<Vec<GraphGroup>, CallError> {
        let url = format!("{}/_apis/graph/groups", self.config.graph_base_url());
        self.get_all("list graph groups", &url, GRAPH_API_VERSION, &[])
    }

    fn teams(&self) -> Result<Vec<Team>, CallError> {
        let url = format!(
            "{}/_apis/projects/{}/teams",
            self.config.organization_url(),
            urlencoding::encode(&self.config.project)
        );
        let top = TEAMS_PAGE_SIZE.to_string();
        let mut teams = Vec::new();
        loop {
            let skip = teams.len().to_string();
            let page: Vec<Team> = self.get_all(
                "list teams",
                &url,
                TEAMS_API_VERSION,
                &[("$top", top.as_str()), ("$skip", skip.as_str())],
            )?;
            let full_page = page.len() == TEAMS_PAGE_SIZE;
            teams.extend(page);
            if !full_page {
                return Ok(teams);
            }
        }
    }

    fn membership_url(&self, member: &IdentityId, group: &RemoteGroup) -> String {
        format!(
            "{}/_apis/graph/memberships/{}/{}",
            self.config.graph_base_url(),
            urlencoding::encode(member.as_str()),
            urlencoding::encode(group.descriptor.as_str())
        )
    }
}

impl PlatformClient for AzureDevOpsClient {
    fn list_groups(&self, kind: ResourceKind) -> Result<Vec<RemoteGroup>, CallError> {
        let graph = self.graph_groups()?;
        match kind {
            ResourceKind::SecurityGroup => Ok(graph
                .into_iter()
                .map(|g| RemoteGroup {
                    id: IdentityId(g.origin_id.unwrap_or_else(|| g.descriptor.clone())),
                    descriptor: IdentityId(g.descriptor),
                    display_name: g.display_name,
                })
                .collect()),
            ResourceKind::Team => {
                // A team's graph group can lag behind the team itself.
                let descriptors: BTreeMap<String, String> = graph
                    .into_iter()
                    .map(|g| (g.display_name, g.descriptor))
                    .collect();
                let mut groups = Vec::new();
                for team in self.teams()? {
                    match descriptors.get(&team.name) {
                        Some(descriptor) => groups.push(RemoteGroup {
                            id: IdentityId(team.id),
                            descriptor: IdentityId(descriptor.clone()),
                            display_name: team.name,
                        }),
                        None => tracing::debug!("team {} has no graph group yet", team.name),
                    }
                }
                Ok(groups)
            }
        }
    }

    fn create_group(&self, kind: ResourceKind, display_name: &str) -> Result<(), CallError> {
        match kind {
            ResourceKind::Team => {
                let url = format!(
                    "{}/_apis/projects/{}/teams",
                    self.config.organization_url(),
                    urlencoding::encode(&self.config.project)
                );
                self.call("create team", false, || {
                    self.request("POST", &url, TEAMS_API_VERSION)
                        .send_json(json!({ "name": display_name }))
                })?;
            }
            ResourceKind::SecurityGroup => {
                let url = format!("{}/_apis/graph/groups", self.config.graph_base_url());
                self.call("create group", false, || {
                    self.request("POST", &url, GRAPH_API_VERSION)
                        .send_json(json!({ "displayName": display_name }))
                })?;
            }
        }
        Ok(())
    }

    fn list_members(&self, group: &RemoteGroup) -> Result<BTreeSet<IdentityId>, CallError> {
        let url = format!(
            "{}/_apis/graph/Memberships/{}",
            self.config.graph_base_url(),
            urlencoding::encode(group.descriptor.as_str())
        );
        let memberships: Vec<GraphMembership> = self.get_all(
            "list group members",
            &url,
            GRAPH_API_VERSION,
            &[("direction", "Down")],
        )?;
        Ok(memberships
            .into_iter()
            .map(|m| IdentityId(m.member_descriptor))
            .collect())
    }

    fn add_member(&self, group: &RemoteGroup, member: &IdentityId) -> Result<(), CallError> {
        let url = self.membership_url(member, group);
        self.call("add group member", true, || {
            self.request("PUT", &url, GRAPH_API_VERSION).call()
        })?;
        Ok(())
    }

    fn remove_member(&self, group: &RemoteGroup, member: &IdentityId) -> Result<(), CallError> {
        let url = self.membership_url(member, group);
        let result = self.call("remove group member", true, || {
            self.request("DELETE", &url, GRAPH_API_VERSION).call()
        });
        // A retried DELETE whose first attempt landed answers 404.
        match result {
            Ok(_) => Ok(()),
            Err(err) if err.is_not_found() => {
                tracing::debug!("{member} already absent from {}", group.display_name);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn find_user(&self, email: &str) -> Result<Option<Identity>, CallError> {
        let operation = "query user";
        let url = format!("{}/_apis/graph/subjectquery", self.config.graph_base_url());
        let response = self.call(operation, true, || {
            self.request("POST", &url, GRAPH_API_VERSION)
                .send_json(json!({ "query": email, "subjectKind": ["User"] }))
        })?;
        let subjects: ValueList<GraphSubject> = decode(operation, response)?;
        let Some(subject) = subjects.value.into_iter().find(|s| s.matches_email(email)) else {
            return Ok(None);
        };

        let operation = "read user storage key";
        let url = format!(
            "{}/_apis/graph/storagekeys/{}",
            self.config.graph_base_url(),
            urlencoding::encode(&subject.descriptor)
        );
        let response = self.call(operation, true, || {
            self.request("GET", &url, GRAPH_API_VERSION).call()
        })?;
        let key: StorageKey = decode(operation, response)?;
        Ok(Some(Identity {
            descriptor: IdentityId(subject.descriptor),
            id: IdentityId(key.value),
        }))
    }

    fn find_repository(&self, name: &str) -> Result<Option<Repository>, CallError> {
        let operation = "read repository";
        let url = format!(
            "{}/_apis/git/repositories/{}",
            self.config.project_url(),
            urlencoding::encode(name)
        );
        match self.call(operation, true, || {
            self.request("GET", &url, GIT_API_VERSION).call()
        }) {
            Ok(response) => decode(operation, response).map(Some),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn list_branch_policies(
        &self,
        repository_id: &str,
        branch_ref: &str,
    ) -> Result<Vec<BranchPolicy>, CallError> {
        let url = format!("{}/_apis/git/policy/configurations", self.config.project_url());
        self.get_all(
            "list branch policies",
            &url,
            POLICY_API_VERSION,
            &[
                ("repositoryId", repository_id),
                ("refName", branch_ref),
                ("policyType", REQUIRED_REVIEWER_POLICY_TYPE),
            ],
        )
    }

    fn create_reviewer_policy(&self, policy: &NewReviewerPolicy) -> Result<(), CallError> {
        let url = format!("{}/_apis/policy/configurations", self.config.project_url());
        self.call("create reviewer policy", false, || {
            self.request("POST", &url, POLICY_API_VERSION).send_json(policy)
        })?;
        Ok(())
    }

    fn update_reviewer_policy(&self, policy: &BranchPolicy) -> Result<(), CallError> {
        let url = format!(
            "{}/_apis/policy/configurations/{}",
            self.config.project_url(),
            policy.id
        );
        self.call("update reviewer policy", true, || {
            self.request("PUT", &url, POLICY_API_VERSION).send_json(policy)
        })?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn call_error(operation: &str, err: ureq::Error) -> CallError {
    match err {
        ureq::Error::Status(status, response) => CallError::Status {
            operation: operation.to_owned(),
            status,
            body: response.into_string().unwrap_or_default(),
        },
        ureq::Error::Transport(transport) => CallError::Transport {
            operation: operation.to_owned(),
            message: transport.to_string(),
        },
    }
}

fn decode<T: DeserializeOwned>(
    operation: &str,
    response: ureq::Response,
) -> Result<T, CallError> {
    response.into_json().map_err(|e| CallError::Decode {
        operation: operation.to_owned(),
        message: e.to_string(),
    })
}
