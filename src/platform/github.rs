//! GitHub provider implementation

use crate::error::{Error, Result};
use crate::platform::{GitProvider, latest_per_context};
use crate::types::{
    Branch, CommitStatus, CommitStatusState, GitRef, IssueType, MergeMethod, PrState,
    PullRequest, User,
};
use async_trait::async_trait;
use octocrab::Octocrab;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Deserialize)]
struct RawBranch {
    name: String,
    commit: RawBranchCommit,
}

#[derive(Deserialize)]
struct RawBranchCommit {
    sha: String,
}

#[derive(Deserialize)]
struct RawStatus {
    state: CommitStatusState,
    context: String,
    description: Option<String>,
    target_url: Option<String>,
}

#[derive(Deserialize)]
struct RawCombinedStatus {
    #[serde(default)]
    total_count: usize,
    #[serde(default)]
    statuses: Vec<RawStatus>,
}

#[derive(Serialize)]
struct RawStatusPayload<'a> {
    state: CommitStatusState,
    context: &'a str,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_url: Option<&'a str>,
}

#[derive(Deserialize)]
struct RawPermission {
    permission: String,
}

/// GitHub service using octocrab for pulls/issues and raw HTTP for statuses
pub struct GitHubService {
    client: Octocrab,
    owner: String,
    repo: String,
    /// Token for raw HTTP requests
    token: String,
    /// HTTP client for raw requests
    http_client: Client,
    /// API base URL (no trailing slash)
    api_url: String,
}

impl GitHubService {
    /// Create a new GitHub service for `owner/repo` behind `api_url`
    pub fn new(token: &str, owner: String, repo: String, api_url: &str) -> Result<Self> {
        let api_url = api_url.trim_end_matches('/').to_string();

        let client = Octocrab::builder()
            .personal_token(token.to_string())
            .base_uri(api_url.as_str())
            .map_err(|e| Error::GitHubApi(e.to_string()))?
            .build()
            .map_err(|e| Error::GitHubApi(e.to_string()))?;

        let http_client = Client::builder()
            .user_agent("pr-blocker")
            .build()
            .map_err(|e| Error::GitHubApi(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            owner,
            repo,
            token: token.to_string(),
            http_client,
            api_url,
        })
    }

    fn repo_url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}{}", self.api_url, self.owner, self.repo, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }
}

/// Helper to convert octocrab PR to our `PullRequest` type
fn pr_from_octocrab(pr: &octocrab::models::pulls::PullRequest) -> PullRequest {
    PullRequest {
        id: pr.number,
        title: pr.title.as_deref().unwrap_or_default().to_string(),
        state: match pr.state {
            Some(octocrab::models::IssueState::Open) => PrState::Open,
            _ => PrState::Closed,
        },
        author: pr
            .user
            .as_ref()
            .map(|u| User {
                id: u.id.0,
                name: u.login.clone(),
                email: String::new(),
            })
            .unwrap_or_default(),
        url: pr
            .html_url
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
        base: GitRef {
            reference: pr.base.ref_field.clone(),
            sha: pr.base.sha.clone(),
        },
        head: GitRef {
            reference: pr.head.ref_field.clone(),
            sha: pr.head.sha.clone(),
        },
        labels: pr
            .labels
            .as_ref()
            .map(|labels| labels.iter().map(|l| l.name.clone()).collect())
            .unwrap_or_default(),
        mergeable: pr.mergeable.unwrap_or(false),
    }
}

#[async_trait]
impl GitProvider for GitHubService {
    async fn list_pull_requests(&self, open_only: bool) -> Result<Vec<PullRequest>> {
        debug!(repo = %self.repo, open_only, "listing PRs");
        let state = if open_only {
            octocrab::params::State::Open
        } else {
            octocrab::params::State::All
        };

        let page = self
            .client
            .pulls(&self.owner, &self.repo)
            .list()
            .state(state)
            .per_page(100)
            .send()
            .await?;
        let prs = self.client.all_pages(page).await?;

        let result: Vec<PullRequest> = prs.iter().map(pr_from_octocrab).collect();
        debug!(count = result.len(), "listed PRs");
        Ok(result)
    }

    async fn get_pull_request(&self, id: u64) -> Result<PullRequest> {
        debug!(pr_number = id, "getting PR");
        let pr = self.client.pulls(&self.owner, &self.repo).get(id).await?;
        Ok(pr_from_octocrab(&pr))
    }

    async fn get_branch(&self, name: &str) -> Result<Branch> {
        debug!(branch = name, "getting branch");
        let url = self.repo_url(&format!("/branches/{}", urlencoding::encode(name)));

        let branch: RawBranch = self
            .authorized(self.http_client.get(&url))
            .send()
            .await
            .map_err(|e| Error::GitHubApi(format!("Failed to fetch branch: {e}")))?
            .error_for_status()
            .map_err(|e| Error::GitHubApi(format!("Failed to fetch branch: {e}")))?
            .json()
            .await
            .map_err(|e| Error::GitHubApi(format!("Failed to parse branch: {e}")))?;

        Ok(Branch {
            name: branch.name,
            commit_id: branch.commit.sha,
        })
    }

    async fn list_commit_statuses(&self, reference: &str) -> Result<Vec<CommitStatus>> {
        // combined status: one entry per context, paged by context
        let url = self.repo_url(&format!("/commits/{reference}/status"));

        let mut statuses = Vec::new();
        for page in 1u32.. {
            let page = page.to_string();
            let combined: RawCombinedStatus = self
                .authorized(self.http_client.get(&url))
                .query(&[("per_page", "100"), ("page", page.as_str())])
                .send()
                .await
                .map_err(|e| Error::GitHubApi(format!("Failed to fetch commit statuses: {e}")))?
                .error_for_status()
                .map_err(|e| Error::GitHubApi(format!("Failed to fetch commit statuses: {e}")))?
                .json()
                .await
                .map_err(|e| Error::GitHubApi(format!("Failed to parse commit statuses: {e}")))?;

            let received = combined.statuses.len();
            statuses.extend(combined.statuses);
            if received == 0 || statuses.len() >= combined.total_count {
                break;
            }
        }

        let result = latest_per_context(statuses.into_iter().map(|s| CommitStatus {
            context: s.context,
            state: s.state,
            description: s.description.unwrap_or_default(),
            target_url: s.target_url.unwrap_or_default(),
        }));
        debug!(reference, count = result.len(), "listed commit statuses");
        Ok(result)
    }

    async fn set_commit_status(&self, sha: &str, status: &CommitStatus) -> Result<()> {
        debug!(sha, context = %status.context, state = %status.state, "setting commit status");
        let url = self.repo_url(&format!("/statuses/{sha}"));
        let payload = RawStatusPayload {
            state: status.state,
            context: &status.context,
            description: &status.description,
            target_url: Some(status.target_url.as_str()).filter(|u| !u.is_empty()),
        };

        self.authorized(self.http_client.post(&url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::GitHubApi(format!("Failed to set commit status: {e}")))?
            .error_for_status()
            .map_err(|e| Error::GitHubApi(format!("Failed to set commit status: {e}")))?;
        Ok(())
    }

    async fn merge_pull_request(
        &self,
        id: u64,
        sha: &str,
        method: MergeMethod,
        message: &str,
    ) -> Result<()> {
        debug!(pr_number = id, %method, "merging PR");
        let octocrab_method = match method {
            MergeMethod::Squash => octocrab::params::pulls::MergeMethod::Squash,
            MergeMethod::Merge => octocrab::params::pulls::MergeMethod::Merge,
        };

        let pulls = self.client.pulls(&self.owner, &self.repo);
        let mut builder = pulls.merge(id).method(octocrab_method).sha(sha);
        if !message.is_empty() {
            builder = builder.message(message);
        }

        let result = builder
            .send()
            .await
            .map_err(|e| Error::GitHubApi(format!("Merge failed: {e}")))?;

        if !result.merged {
            return Err(Error::GitHubApi(format!(
                "PR #{id} was not merged: {}",
                result.message.unwrap_or_default()
            )));
        }
        debug!(pr_number = id, sha = ?result.sha, "merge complete");
        Ok(())
    }

    async fn can_user_write_to_repo(&self, user: &User) -> Result<bool> {
        let url = self.repo_url(&format!(
            "/collaborators/{}/permission",
            urlencoding::encode(&user.name)
        ));

        let response = self
            .authorized(self.http_client.get(&url))
            .send()
            .await
            .map_err(|e| Error::GitHubApi(format!("Failed to fetch permission: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }

        let permission: RawPermission = response
            .error_for_status()
            .map_err(|e| Error::GitHubApi(format!("Failed to fetch permission: {e}")))?
            .json()
            .await
            .map_err(|e| Error::GitHubApi(format!("Failed to parse permission: {e}")))?;

        Ok(matches!(
            permission.permission.as_str(),
            "admin" | "maintain" | "write"
        ))
    }

    async fn register_comment(&self, _kind: IssueType, id: u64, body: &str) -> Result<()> {
        debug!(pr_number = id, "creating comment");
        self.client
            .issues(&self.owner, &self.repo)
            .create_comment(id, body)
            .await?;
        Ok(())
    }

    async fn set_label(&self, _kind: IssueType, id: u64, label: &str) -> Result<()> {
        debug!(pr_number = id, label, "adding label");
        self.client
            .issues(&self.owner, &self.repo)
            .add_labels(id, &[label.to_string()])
            .await?;
        Ok(())
    }

    async fn delete_label(&self, _kind: IssueType, id: u64, label: &str) -> Result<()> {
        debug!(pr_number = id, label, "removing label");
        self.client
            .issues(&self.owner, &self.repo)
            .remove_label(id, label)
            .await?;
        Ok(())
    }
}
