//! Git provider services for GitHub and GitLab
//!
//! Provides one capability set over both hosts. The engine only talks to
//! [`GitProvider`]; which implementation backs a repository is decided by a
//! [`ProviderFactory`].

mod factory;
mod github;
mod gitlab;

pub use factory::{DefaultProviderFactory, ProviderFactory, create_provider};
pub use github::GitHubService;
pub use gitlab::GitLabService;

use crate::error::Result;
use crate::types::{Branch, CommitStatus, IssueType, MergeMethod, PullRequest, User};
use async_trait::async_trait;
use std::collections::HashMap;

/// Git provider capability set, bound to one repository
#[async_trait]
pub trait GitProvider: Send + Sync {
    /// List pull requests; only open ones when `open_only`
    async fn list_pull_requests(&self, open_only: bool) -> Result<Vec<PullRequest>>;

    /// Fetch one pull request with live mergeability
    async fn get_pull_request(&self, id: u64) -> Result<PullRequest>;

    /// Fetch a branch and its tip
    async fn get_branch(&self, name: &str) -> Result<Branch>;

    /// Latest commit status per context for `reference`
    async fn list_commit_statuses(&self, reference: &str) -> Result<Vec<CommitStatus>>;

    /// Publish a commit status on `sha`
    async fn set_commit_status(&self, sha: &str, status: &CommitStatus) -> Result<()>;

    /// Merge a pull request at `sha`; an empty message lets the host choose
    async fn merge_pull_request(
        &self,
        id: u64,
        sha: &str,
        method: MergeMethod,
        message: &str,
    ) -> Result<()>;

    /// Whether `user` may push to the repository
    async fn can_user_write_to_repo(&self, user: &User) -> Result<bool>;

    /// Comment on an issue or pull request
    async fn register_comment(&self, kind: IssueType, id: u64, body: &str) -> Result<()>;

    /// Add a label to an issue or pull request
    async fn set_label(&self, kind: IssueType, id: u64, label: &str) -> Result<()>;

    /// Remove a label from an issue or pull request
    async fn delete_label(&self, kind: IssueType, id: u64, label: &str) -> Result<()>;
}

/// Keep the first status seen per context
///
/// Both hosts return statuses newest first.
fn latest_per_context(statuses: impl IntoIterator<Item = CommitStatus>) -> Vec<CommitStatus> {
    let mut seen: HashMap<String, CommitStatus> = HashMap::new();
    let mut order = Vec::new();
    for status in statuses {
        if !seen.contains_key(&status.context) {
            order.push(status.context.clone());
            seen.insert(status.context.clone(), status);
        }
    }
    order
        .into_iter()
        .filter_map(|context| seen.remove(&context))
        .collect()
}
