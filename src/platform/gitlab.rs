//! GitLab provider implementation

use crate::error::{Error, Result};
use crate::platform::{GitProvider, latest_per_context};
use crate::types::{
    Branch, CommitStatus, CommitStatusState, GitRef, IssueType, MergeMethod, PrState,
    PullRequest, User,
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::debug;

/// Page size for list endpoints
const PER_PAGE: usize = 100;

/// Developer access level and above can push
const DEVELOPER_ACCESS: u32 = 30;

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// GitLab service using reqwest
pub struct GitLabService {
    client: Client,
    token: String,
    api_url: String,
    project_path: String,
}

#[derive(Deserialize)]
struct MrAuthor {
    id: u64,
    username: String,
}

#[derive(Deserialize)]
struct DiffRefs {
    base_sha: Option<String>,
}

#[derive(Deserialize)]
struct MergeRequest {
    iid: u64,
    title: String,
    state: String, // "opened", "closed", "merged", "locked"
    author: MrAuthor,
    web_url: String,
    source_branch: String,
    target_branch: String,
    sha: Option<String>,
    diff_refs: Option<DiffRefs>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    merge_status: String, // "can_be_merged", "cannot_be_merged", "checking", ...
}

impl From<MergeRequest> for PullRequest {
    fn from(mr: MergeRequest) -> Self {
        Self {
            id: mr.iid,
            title: mr.title,
            state: if mr.state == "opened" {
                PrState::Open
            } else {
                PrState::Closed
            },
            author: User {
                id: mr.author.id,
                name: mr.author.username,
                email: String::new(),
            },
            url: mr.web_url,
            base: GitRef {
                reference: mr.target_branch,
                sha: mr
                    .diff_refs
                    .and_then(|d| d.base_sha)
                    .unwrap_or_default(),
            },
            head: GitRef {
                reference: mr.source_branch,
                sha: mr.sha.unwrap_or_default(),
            },
            labels: mr.labels,
            mergeable: mr.merge_status == "can_be_merged",
        }
    }
}

#[derive(Deserialize)]
struct RawBranch {
    name: String,
    commit: RawBranchCommit,
}

#[derive(Deserialize)]
struct RawBranchCommit {
    id: String,
}

#[derive(Deserialize)]
struct RawStatus {
    name: String,
    status: String,
    description: Option<String>,
    target_url: Option<String>,
}

#[derive(Deserialize)]
struct RawMember {
    access_level: u32,
}

/// Map a GitLab pipeline status onto a commit status state
fn state_from_gitlab(status: &str) -> CommitStatusState {
    match status {
        "success" => CommitStatusState::Success,
        "failed" | "canceled" => CommitStatusState::Failure,
        _ => CommitStatusState::Pending,
    }
}

const fn state_to_gitlab(state: CommitStatusState) -> &'static str {
    match state {
        CommitStatusState::Pending => "pending",
        CommitStatusState::Success => "success",
        CommitStatusState::Failure | CommitStatusState::Error => "failed",
    }
}

impl GitLabService {
    /// Create a new GitLab service for `project_path` behind `api_url`
    pub fn new(token: String, project_path: String, api_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::GitLabApi(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            token,
            api_url: api_url.trim_end_matches('/').to_string(),
            project_path,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/api/v4/projects/{}{}",
            self.api_url,
            urlencoding::encode(&self.project_path),
            path
        )
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("PRIVATE-TOKEN", &self.token)
    }

    const fn issue_path(kind: IssueType) -> &'static str {
        match kind {
            IssueType::Issue => "issues",
            IssueType::PullRequest => "merge_requests",
        }
    }
}

#[async_trait]
impl GitProvider for GitLabService {
    async fn list_pull_requests(&self, open_only: bool) -> Result<Vec<PullRequest>> {
        debug!(project = %self.project_path, open_only, "listing MRs");
        let url = self.api_url("/merge_requests");
        let state = if open_only { "opened" } else { "all" };

        let mut result = Vec::new();
        for page in 1.. {
            let mrs: Vec<MergeRequest> = self
                .authorized(self.client.get(&url))
                .query(&[
                    ("state", state.to_string()),
                    ("per_page", PER_PAGE.to_string()),
                    ("page", page.to_string()),
                ])
                .send()
                .await?
                .error_for_status()
                .map_err(|e| Error::GitLabApi(e.to_string()))?
                .json()
                .await?;

            let last = mrs.len() < PER_PAGE;
            result.extend(mrs.into_iter().map(PullRequest::from));
            if last {
                break;
            }
        }

        debug!(count = result.len(), "listed MRs");
        Ok(result)
    }

    async fn get_pull_request(&self, id: u64) -> Result<PullRequest> {
        debug!(mr_iid = id, "getting MR");
        let mr: MergeRequest = self
            .authorized(self.client.get(self.api_url(&format!("/merge_requests/{id}"))))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::GitLabApi(e.to_string()))?
            .json()
            .await?;
        Ok(mr.into())
    }

    async fn get_branch(&self, name: &str) -> Result<Branch> {
        debug!(branch = name, "getting branch");
        let url = self.api_url(&format!(
            "/repository/branches/{}",
            urlencoding::encode(name)
        ));
        let branch: RawBranch = self
            .authorized(self.client.get(&url))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::GitLabApi(e.to_string()))?
            .json()
            .await?;

        Ok(Branch {
            name: branch.name,
            commit_id: branch.commit.id,
        })
    }

    async fn list_commit_statuses(&self, reference: &str) -> Result<Vec<CommitStatus>> {
        let url = self.api_url(&format!("/repository/commits/{reference}/statuses"));
        let statuses: Vec<RawStatus> = self
            .authorized(self.client.get(&url))
            .query(&[("per_page", PER_PAGE.to_string())])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::GitLabApi(e.to_string()))?
            .json()
            .await?;

        let result = latest_per_context(statuses.into_iter().map(|s| CommitStatus {
            state: state_from_gitlab(&s.status),
            context: s.name,
            description: s.description.unwrap_or_default(),
            target_url: s.target_url.unwrap_or_default(),
        }));
        debug!(reference, count = result.len(), "listed commit statuses");
        Ok(result)
    }

    async fn set_commit_status(&self, sha: &str, status: &CommitStatus) -> Result<()> {
        debug!(sha, context = %status.context, state = %status.state, "setting commit status");
        let mut body = serde_json::json!({
            "state": state_to_gitlab(status.state),
            "name": status.context,
            "description": status.description,
        });
        if !status.target_url.is_empty() {
            body["target_url"] = serde_json::Value::String(status.target_url.clone());
        }

        self.authorized(self.client.post(self.api_url(&format!("/statuses/{sha}"))))
            .json(&body)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::GitLabApi(format!("failed to set commit status: {e}")))?;
        Ok(())
    }

    async fn merge_pull_request(
        &self,
        id: u64,
        sha: &str,
        method: MergeMethod,
        message: &str,
    ) -> Result<()> {
        debug!(mr_iid = id, %method, "merging MR");
        let mut body = serde_json::json!({
            "sha": sha,
            "squash": method == MergeMethod::Squash,
        });
        if !message.is_empty() {
            let key = match method {
                MergeMethod::Squash => "squash_commit_message",
                MergeMethod::Merge => "merge_commit_message",
            };
            body[key] = serde_json::Value::String(message.to_string());
        }

        self.authorized(
            self.client
                .put(self.api_url(&format!("/merge_requests/{id}/merge"))),
        )
        .json(&body)
        .send()
        .await?
        .error_for_status()
        .map_err(|e| Error::GitLabApi(format!("Merge failed: {e}")))?;

        debug!(mr_iid = id, "merge complete");
        Ok(())
    }

    async fn can_user_write_to_repo(&self, user: &User) -> Result<bool> {
        let response = self
            .authorized(
                self.client
                    .get(self.api_url(&format!("/members/all/{}", user.id))),
            )
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }

        let member: RawMember = response
            .error_for_status()
            .map_err(|e| Error::GitLabApi(e.to_string()))?
            .json()
            .await?;
        Ok(member.access_level >= DEVELOPER_ACCESS)
    }

    async fn register_comment(&self, kind: IssueType, id: u64, body: &str) -> Result<()> {
        debug!(iid = id, "creating note");
        let url = self.api_url(&format!("/{}/{id}/notes", Self::issue_path(kind)));
        self.authorized(self.client.post(&url))
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::GitLabApi(e.to_string()))?;
        Ok(())
    }

    async fn set_label(&self, kind: IssueType, id: u64, label: &str) -> Result<()> {
        debug!(iid = id, label, "adding label");
        let url = self.api_url(&format!("/{}/{id}", Self::issue_path(kind)));
        self.authorized(self.client.put(&url))
            .json(&serde_json::json!({ "add_labels": label }))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::GitLabApi(e.to_string()))?;
        Ok(())
    }

    async fn delete_label(&self, kind: IssueType, id: u64, label: &str) -> Result<()> {
        debug!(iid = id, label, "removing label");
        let url = self.api_url(&format!("/{}/{id}", Self::issue_path(kind)));
        self.authorized(self.client.put(&url))
            .json(&serde_json::json!({ "remove_labels": label }))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::GitLabApi(e.to_string()))?;
        Ok(())
    }
}
